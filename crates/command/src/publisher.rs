//! Publish/subscribe boundary for time-stamped state samples.

use std::fmt;

use tracing::{debug, trace};

use crate::PublishError;

/// Identifier returned by [`Publisher::register_published_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub usize);

/// Plot-style directives forwarded to every subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenAction {
    PenUp,
    PenDown,
    Darken,
    Lighten,
    BreakPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub id: StreamId,
    pub owners: Vec<String>,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub stream: StreamId,
    /// A.1 modified Julian date of the sample.
    pub epoch_mjd: f64,
    pub values: Vec<f64>,
    /// Set on the sample a `Propagate` emits at its stopping point.
    pub is_final: bool,
}

/// Receiver of published data.
pub trait Subscriber: fmt::Debug + Send {
    fn name(&self) -> &str;

    fn register_stream(&mut self, _info: &StreamInfo) {}

    fn receive(&mut self, sample: &Sample) -> Result<(), String>;

    fn pen_action(&mut self, _action: PenAction) {}

    fn flush(&mut self) -> Result<(), String> {
        Ok(())
    }
}

/// Samples retained by [`Publisher::new`].
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

#[derive(Debug)]
pub struct Publisher {
    streams: Vec<StreamInfo>,
    subscribers: Vec<Box<dyn Subscriber>>,
    history: Vec<Sample>,
    history_limit: usize,
    pen_actions: Vec<PenAction>,
}

impl Default for Publisher {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publisher that keeps at most `limit` of the most recent samples in memory.
    ///
    /// Subscribers still see every sample; `0` disables retention.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            streams: Vec::new(),
            subscribers: Vec::new(),
            history: Vec::new(),
            history_limit: limit,
            pen_actions: Vec::new(),
        }
    }

    pub fn set_history_limit(&mut self, limit: usize) {
        self.history_limit = limit;
        self.trim_history();
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn subscribe(&mut self, mut subscriber: Box<dyn Subscriber>) {
        for info in &self.streams {
            subscriber.register_stream(info);
        }
        debug!(subscriber = subscriber.name(), "subscriber attached");
        self.subscribers.push(subscriber);
    }

    /// Detach every subscriber, returning them to the caller.
    pub fn unsubscribe_all(&mut self) -> Vec<Box<dyn Subscriber>> {
        std::mem::take(&mut self.subscribers)
    }

    pub fn register_published_data(&mut self, owners: Vec<String>, labels: Vec<String>) -> StreamId {
        let id = StreamId(self.streams.len());
        let info = StreamInfo { id, owners, labels };
        for subscriber in &mut self.subscribers {
            subscriber.register_stream(&info);
        }
        self.streams.push(info);
        id
    }

    pub fn stream(&self, id: StreamId) -> Option<&StreamInfo> {
        self.streams.get(id.0)
    }

    pub fn publish(
        &mut self,
        stream: StreamId,
        epoch_mjd: f64,
        values: &[f64],
        is_final: bool,
    ) -> Result<(), PublishError> {
        let info = self
            .streams
            .get(stream.0)
            .ok_or(PublishError::UnknownStream(stream.0))?;
        if info.labels.len() != values.len() {
            return Err(PublishError::LengthMismatch {
                stream: stream.0,
                expected: info.labels.len(),
                found: values.len(),
            });
        }
        let sample = Sample {
            stream,
            epoch_mjd,
            values: values.to_vec(),
            is_final,
        };
        trace!(stream = stream.0, epoch_mjd, is_final, "publish");
        for subscriber in &mut self.subscribers {
            subscriber
                .receive(&sample)
                .map_err(|message| PublishError::Subscriber {
                    name: subscriber.name().to_string(),
                    message,
                })?;
        }
        if self.history_limit > 0 {
            if self.history.len() >= self.history_limit {
                // Drop the oldest half at once so trimming stays amortized.
                let keep = self.history_limit / 2;
                self.history.drain(..self.history.len() - keep);
            }
            self.history.push(sample);
        }
        Ok(())
    }

    fn trim_history(&mut self) {
        if self.history.len() > self.history_limit {
            self.history.drain(..self.history.len() - self.history_limit);
        }
    }

    pub fn pen_action(&mut self, action: PenAction) {
        for subscriber in &mut self.subscribers {
            subscriber.pen_action(action);
        }
        self.pen_actions.push(action);
    }

    pub fn flush_buffers(&mut self) -> Result<(), PublishError> {
        for subscriber in &mut self.subscribers {
            subscriber
                .flush()
                .map_err(|message| PublishError::Subscriber {
                    name: subscriber.name().to_string(),
                    message,
                })?;
        }
        Ok(())
    }

    /// Recent samples published since the last [`Self::clear`], oldest first.
    ///
    /// At most the history limit is kept.
    pub fn samples(&self) -> &[Sample] {
        &self.history
    }

    pub fn samples_for(&self, stream: StreamId) -> impl Iterator<Item = &Sample> {
        self.history.iter().filter(move |s| s.stream == stream)
    }

    pub fn pen_actions(&self) -> &[PenAction] {
        &self.pen_actions
    }

    /// Forget streams and recorded history; subscribers stay attached.
    pub fn clear(&mut self) {
        self.streams.clear();
        self.history.clear();
        self.pen_actions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Counter {
        received: usize,
    }

    impl Subscriber for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn receive(&mut self, _sample: &Sample) -> Result<(), String> {
            self.received += 1;
            Ok(())
        }
    }

    #[test]
    fn publish_checks_stream_width() {
        let mut publisher = Publisher::new();
        publisher.subscribe(Box::new(Counter::default()));
        let id = publisher.register_published_data(vec!["Sat".into()], vec!["Sat.X".into()]);
        publisher.publish(id, 21_545.0, &[7_000.0], false).unwrap();
        assert!(matches!(
            publisher.publish(id, 21_545.0, &[1.0, 2.0], false),
            Err(PublishError::LengthMismatch { .. })
        ));
        assert_eq!(publisher.samples().len(), 1);
    }

    #[test]
    fn history_keeps_only_recent_samples() {
        let mut publisher = Publisher::with_history_limit(4);
        let id = publisher.register_published_data(vec!["Sat".into()], vec!["Sat.X".into()]);
        for i in 0..10 {
            publisher.publish(id, 21_545.0 + i as f64, &[i as f64], false).unwrap();
        }
        let kept: Vec<f64> = publisher.samples().iter().map(|s| s.values[0]).collect();
        assert!(kept.len() <= 4, "kept {kept:?}");
        assert_eq!(kept.last(), Some(&9.0));
        assert!(kept.windows(2).all(|w| w[1] == w[0] + 1.0), "kept {kept:?}");

        let mut quiet = Publisher::with_history_limit(0);
        quiet.subscribe(Box::new(Counter::default()));
        let id = quiet.register_published_data(vec!["Sat".into()], vec!["Sat.X".into()]);
        quiet.publish(id, 21_545.0, &[1.0], true).unwrap();
        assert!(quiet.samples().is_empty());
    }
}
