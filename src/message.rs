//! Progress messages emitted while training.
//!
//! The trainer reports progress as text lines. Every line goes through a
//! [`Logger`], which feeds the [`TrainLogParser`] and then hands the line to
//! the installed [`MessageHook`]. Hook failures never reach the trainer: both
//! errors and panics are caught here and logged as warnings.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{info, warn};

use crate::log_parser::{TrainEvent, TrainLogParser};

/// Receiver of the trainer's progress messages
pub trait MessageHook {
    /// Called with every progress message, in order.
    fn message(&mut self, text: &str) -> anyhow::Result<()>;

    /// Called after `message` when the message completed a milestone.
    fn event(&mut self, _event: TrainEvent, _log: &TrainLogParser) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Default hook: forwards complete lines to `tracing` at info level
#[derive(Debug, Default)]
pub struct LogHook {
    verbose: bool,
    pending: String,
}

impl LogHook {
    /// With `verbose` off the hook only keeps milestone messages.
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            pending: String::new(),
        }
    }
}

impl MessageHook for LogHook {
    fn message(&mut self, text: &str) -> anyhow::Result<()> {
        self.pending.push_str(text);
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            let line = line.trim_end();
            if self.verbose && !line.is_empty() {
                info!(target: "crfkit::train", "{}", line);
            }
        }
        Ok(())
    }

    fn event(&mut self, event: TrainEvent, log: &TrainLogParser) -> anyhow::Result<()> {
        if self.verbose {
            return Ok(());
        }
        match event {
            TrainEvent::FeatgenEnd => info!(
                target: "crfkit::train",
                num_features = log.featgen_num_features,
                "feature generation finished"
            ),
            TrainEvent::Iteration => {
                if let Some(it) = log.last_iteration() {
                    info!(
                        target: "crfkit::train",
                        iteration = it.num,
                        loss = it.loss,
                        item_accuracy = it.item_accuracy_float,
                        "iteration finished"
                    );
                }
            }
            TrainEvent::End => info!(
                target: "crfkit::train",
                seconds = log.training_seconds,
                "model stored"
            ),
            _ => {}
        }
        Ok(())
    }
}

impl<F> MessageHook for F
where
    F: FnMut(&str) -> anyhow::Result<()>,
{
    fn message(&mut self, text: &str) -> anyhow::Result<()> {
        self(text)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Error boundary between the trainer and the message hook
pub(crate) struct Logger<'a> {
    hook: &'a mut dyn MessageHook,
    parser: &'a mut TrainLogParser,
    percent: u32,
}

impl<'a> Logger<'a> {
    pub(crate) fn new(hook: &'a mut dyn MessageHook, parser: &'a mut TrainLogParser) -> Self {
        Self {
            hook,
            parser,
            percent: 0,
        }
    }

    /// Deliver one message. Never fails.
    pub(crate) fn message(&mut self, text: &str) {
        let event = self.parser.feed(text);
        let hook = &mut *self.hook;
        let parser = &*self.parser;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<()> {
            hook.message(text)?;
            if let Some(event) = event {
                hook.event(event, parser)?;
            }
            Ok(())
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("message hook failed: {:?}", err),
            Err(payload) => warn!(
                "message hook panicked: {}",
                panic_message(payload.as_ref())
            ),
        }
    }

    pub(crate) fn progress_start(&mut self) {
        self.percent = 0;
        self.progress(0);
    }

    /// Advance the progress bar to `percent`
    pub(crate) fn progress(&mut self, percent: u32) {
        while self.percent < percent.min(100) {
            if self.percent % 2 == 0 {
                if self.percent % 10 == 0 {
                    let text = (self.percent / 10).to_string();
                    self.message(&text);
                } else {
                    self.message(".");
                }
            }
            self.percent += 1;
        }
    }

    pub(crate) fn progress_end(&mut self) {
        self.progress(100);
        if self.percent == 100 {
            self.message("10\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        messages: Vec<String>,
        events: Vec<TrainEvent>,
    }

    impl MessageHook for Recorder {
        fn message(&mut self, text: &str) -> anyhow::Result<()> {
            self.messages.push(text.to_string());
            Ok(())
        }

        fn event(&mut self, event: TrainEvent, _log: &TrainLogParser) -> anyhow::Result<()> {
            self.events.push(event);
            Ok(())
        }
    }

    #[test]
    fn test_progress_bar() {
        let mut hook = Recorder::default();
        let mut parser = TrainLogParser::new();
        {
            let mut logger = Logger::new(&mut hook, &mut parser);
            logger.message("Feature generation\n");
            logger.progress_start();
            logger.progress(50);
            logger.progress_end();
        }
        let bar: String = hook.messages[1..].concat();
        assert_eq!(bar, "0....1....2....3....4....5....6....7....8....9....10\n");
        assert_eq!(parser.featgen_percent, 100);
        assert_eq!(hook.events[0], TrainEvent::Start);
    }

    #[test]
    fn test_hook_errors_are_contained() {
        let mut calls = 0;
        let mut failing = |_: &str| -> anyhow::Result<()> {
            calls += 1;
            anyhow::bail!("hook refused the message")
        };
        let mut parser = TrainLogParser::new();
        let mut logger = Logger::new(&mut failing, &mut parser);
        logger.message("first\n");
        logger.message("second\n");
        drop(logger);
        assert_eq!(calls, 2);
        assert_eq!(parser.log(), "first\nsecond\n");
    }

    #[test]
    fn test_hook_panics_are_contained() {
        let mut panicking = |text: &str| -> anyhow::Result<()> {
            if text.starts_with("boom") {
                panic!("hook exploded");
            }
            Ok(())
        };
        let mut parser = TrainLogParser::new();
        let mut logger = Logger::new(&mut panicking, &mut parser);
        logger.message("boom\n");
        logger.message("still running\n");
        drop(logger);
        assert_eq!(parser.log(), "boom\nstill running\n");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
