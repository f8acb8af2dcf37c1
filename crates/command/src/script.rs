//! Line-oriented mission script loader.
//!
//! One command per line; `%` starts a comment line that is attached to the
//! next command, and a trailing `...` continues a command on the next line.
//! Lines whose keyword is not a known command but which contain `=` are
//! read as assignments.

use tracing::debug;

use crate::CommandError;
use crate::command::GmatCommand;
use crate::commands::Assignment;
use crate::factory::CommandFactory;
use crate::sequence::Sequence;

const CONTINUATION: &str = "...";

#[derive(Debug, Default)]
pub struct ScriptLoader {
    factory: CommandFactory,
}

impl ScriptLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory(factory: CommandFactory) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &CommandFactory {
        &self.factory
    }

    /// Build one command from a single logical script line.
    pub fn parse_command(&self, line: &str) -> Result<Box<dyn GmatCommand>, CommandError> {
        let keyword = leading_keyword(line);
        let mut command = match keyword {
            "GMAT" => Box::new(Assignment::new()) as Box<dyn GmatCommand>,
            _ => match self.factory.create(keyword) {
                Some(command) => command,
                None if line.contains('=') => Box::new(Assignment::new()),
                None => return Err(CommandError::UnknownCommand(keyword.to_string())),
            },
        };
        command.interpret_action(line)?;
        Ok(command)
    }

    /// Parse a whole script into a closed sequence.
    pub fn parse(&self, text: &str) -> Result<Sequence, CommandError> {
        let mut sequence = Sequence::new();
        let mut comments: Vec<String> = Vec::new();
        let mut pending: Option<(usize, String)> = None;

        for (index, raw) in text.lines().enumerate() {
            let number = index + 1;
            let trimmed = raw.trim();
            let (start, mut logical) = match pending.take() {
                Some((start, mut joined)) => {
                    joined.push(' ');
                    joined.push_str(trimmed);
                    (start, joined)
                }
                None => (number, trimmed.to_string()),
            };
            if let Some(head) = logical.strip_suffix(CONTINUATION) {
                pending = Some((start, head.trim_end().to_string()));
                continue;
            }
            logical = logical.trim().to_string();
            if logical.is_empty() {
                continue;
            }
            if logical.starts_with('%') {
                comments.push(logical);
                continue;
            }
            if leading_keyword(&logical) == "BeginMissionSequence" {
                comments.clear();
                continue;
            }
            let at_line = |source: CommandError| CommandError::AtLine {
                line: start,
                source: Box::new(source),
            };
            let mut command = self.parse_command(&logical).map_err(at_line)?;
            if !comments.is_empty() {
                command
                    .base_mut()
                    .set_comment(Some(std::mem::take(&mut comments).join("\n")));
            }
            sequence.append(command).map_err(at_line)?;
        }
        if let Some((start, _)) = pending {
            return Err(CommandError::AtLine {
                line: start,
                source: Box::new(CommandError::parse("Script", "continuation at end of script")),
            });
        }
        if !sequence.is_closed() {
            return Err(CommandError::Structure(
                "script ends inside an unterminated branch".into(),
            ));
        }
        debug!(commands = sequence.len(), "script parsed");
        Ok(sequence)
    }
}

/// Parse `text` with the default command set.
pub fn parse_script(text: &str) -> Result<Sequence, CommandError> {
    ScriptLoader::new().parse(text)
}

fn leading_keyword(line: &str) -> &str {
    let end = line
        .find(|c: char| c.is_whitespace() || matches!(c, '(' | ';' | '\'' | '='))
        .unwrap_or(line.len());
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::GenMode;

    const SCRIPT: &str = "\
BeginMissionSequence;
% raise the orbit
Target DC1 {ExitMode = SaveAndContinue};
   Vary DC1(Burn.V = 1, {Perturbation = 0.0001, MaxStep = 0.5});
   Propagate Prop(Sat, ...
      {Sat.ElapsedSecs = 60});
   Achieve DC1(Sat.RMAG = 7100, {Tolerance = 0.1});
EndTarget;
x = x + 1";

    #[test]
    fn comments_continuations_and_nesting() {
        let sequence = parse_script(SCRIPT).unwrap();
        assert_eq!(sequence.len(), 3);
        let target = &sequence.commands()[1];
        assert_eq!(target.base().comment(), Some("% raise the orbit"));
        assert_eq!(target.branch().map(|b| b.commands(0).len()), Some(4));
        let expected = "\
% raise the orbit
Target DC1 {ExitMode = SaveAndContinue};
   Vary DC1(Burn.V = 1, {Perturbation = 0.0001, MaxStep = 0.5});
   Propagate Prop(Sat) {Sat.ElapsedSecs = 60};
   Achieve DC1(Sat.RMAG = 7100, {Tolerance = 0.1});
EndTarget;
GMAT x = x + 1;";
        assert_eq!(sequence.generating_string(GenMode::Full), expected);
    }

    #[test]
    fn unknown_keywords_report_their_line() {
        let err = parse_script("BeginMissionSequence;\nManeuver Burn(Sat);").unwrap_err();
        match err {
            CommandError::AtLine { line, source } => {
                assert_eq!(line, 2);
                assert_eq!(*source, CommandError::UnknownCommand("Maneuver".into()));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn unterminated_branches_are_structure_errors() {
        assert!(matches!(
            parse_script("While x < 3;\nx = x + 1;"),
            Err(CommandError::Structure(_))
        ));
    }
}
