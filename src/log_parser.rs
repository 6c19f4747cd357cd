//! Structured view of the training progress messages.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

static ITERATION_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\*{5} (?:Iteration|Epoch) #(\d+) \*{5}$").expect("Invalid regex: iteration head")
});
static SECONDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Seconds required: (\d+\.\d+)$").expect("Invalid regex: seconds")
});
static NUM_FEATURES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Number of features: (\d+)$").expect("Invalid regex: number of features")
});
static TRAINING_SECONDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Total seconds required for training: (\d+\.\d+)$")
        .expect("Invalid regex: training seconds")
});
static KEY_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:]+): (\S+)$").expect("Invalid regex: iteration value"));
static LABEL_SCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s+(.+): \((\d+), (\d+), (\d+)\) \((\d\.\d+|\*+), (\d\.\d+|\*+), (\d\.\d+|\*+)\)$",
    )
    .expect("Invalid regex: label score")
});
static MACRO_AVERAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Macro-average precision, recall, F1: \((\S+), (\S+), (\S+)\)$")
        .expect("Invalid regex: macro average")
});
static ACCURACY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(Item|Instance) accuracy: (\d+) / (\d+) \((\S+)\)$")
        .expect("Invalid regex: accuracy")
});

/// Milestones recognized in the training log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrainEvent {
    /// First message of a run
    Start,
    /// Feature generation advanced
    FeatgenProgress,
    /// Feature generation finished
    FeatgenEnd,
    /// The first iteration started
    Prepared,
    /// The optimizer failed before its first iteration
    PrepareError,
    /// An iteration report is complete
    Iteration,
    /// The optimizer finished and the model is being stored
    OptimizationEnd,
    /// The model file has been written
    End,
}

/// Holdout scores of one label
#[derive(Debug, Clone, PartialEq)]
pub struct LabelScore {
    pub match_count: u64,
    pub model_count: u64,
    pub ref_count: u64,
    /// `None` when the report prints `******`
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
}

/// One iteration (or epoch) report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Iteration {
    pub num: u32,
    pub loss: Option<f64>,
    pub feature_norm: Option<f64>,
    pub error_norm: Option<f64>,
    pub active_features: Option<u64>,
    pub linesearch_trials: Option<u32>,
    pub linesearch_step: Option<f64>,
    pub time: Option<f64>,
    pub scores: BTreeMap<String, LabelScore>,
    pub avg_precision: Option<f64>,
    pub avg_recall: Option<f64>,
    pub avg_f1: Option<f64>,
    /// `(correct, total)` items of the holdout set
    pub item_accuracy: Option<(u64, u64)>,
    pub item_accuracy_float: Option<f64>,
    /// `(correct, total)` instances of the holdout set
    pub instance_accuracy: Option<(u64, u64)>,
    pub instance_accuracy_float: Option<f64>,
}

impl Iteration {
    fn update(&mut self, line: &str) {
        if let Some(caps) = LABEL_SCORE.captures(line) {
            let score = |i: usize| caps[i].parse().ok();
            let count = |i: usize| caps[i].parse().unwrap_or(0);
            self.scores.insert(
                caps[1].to_string(),
                LabelScore {
                    match_count: count(2),
                    model_count: count(3),
                    ref_count: count(4),
                    precision: score(5),
                    recall: score(6),
                    f1: score(7),
                },
            );
            return;
        }
        if let Some(caps) = MACRO_AVERAGE.captures(line) {
            self.avg_precision = caps[1].parse().ok();
            self.avg_recall = caps[2].parse().ok();
            self.avg_f1 = caps[3].parse().ok();
            return;
        }
        if let Some(caps) = ACCURACY.captures(line) {
            let counts = caps[2].parse().ok().zip(caps[3].parse().ok());
            let ratio = caps[4].parse().ok();
            if &caps[1] == "Item" {
                self.item_accuracy = counts;
                self.item_accuracy_float = ratio;
            } else {
                self.instance_accuracy = counts;
                self.instance_accuracy_float = ratio;
            }
            return;
        }
        if let Some(caps) = KEY_VALUE.captures(line) {
            let value = &caps[2];
            match &caps[1] {
                "Loss" => self.loss = value.parse().ok(),
                "Feature norm" => self.feature_norm = value.parse().ok(),
                "Error norm" => self.error_norm = value.parse().ok(),
                "Active features" => self.active_features = value.parse().ok(),
                "Line search trials" => self.linesearch_trials = value.parse().ok(),
                "Line search step" => self.linesearch_step = value.parse().ok(),
                "Seconds required for this iteration" => self.time = value.parse().ok(),
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Starting,
    Featgen,
    AfterFeatgen,
    Iteration,
    AfterIteration,
    Storing,
}

/// Incremental parser for the progress messages of a training run.
///
/// Each message is fed as it is emitted. Messages that complete a milestone
/// return the corresponding [`TrainEvent`].
#[derive(Debug, Clone, Default)]
pub struct TrainLogParser {
    state: Option<State>,
    log: Vec<String>,
    events: Vec<(TrainEvent, usize, usize)>,
    last_event_end: usize,
    /// Feature generation progress in percent
    pub featgen_percent: u32,
    pub featgen_num_features: Option<u64>,
    pub featgen_seconds: Option<f64>,
    pub training_seconds: Option<f64>,
    pub storing_seconds: Option<f64>,
    pub iterations: Vec<Iteration>,
}

impl TrainLogParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one message; returns the event it completes, if any.
    pub fn feed(&mut self, message: &str) -> Option<TrainEvent> {
        self.log.push(message.to_string());
        let line = message.trim_end_matches(['\r', '\n']);
        let event = match self.state {
            None => {
                self.state = Some(State::Starting);
                self.handle_starting(line);
                Some(TrainEvent::Start)
            }
            Some(State::Starting) => self.handle_starting(line),
            Some(State::Featgen) => self.handle_featgen(line),
            Some(State::AfterFeatgen) => self.handle_after_featgen(line),
            Some(State::Iteration) => self.handle_iteration(line),
            Some(State::AfterIteration) => self.handle_after_iteration(line),
            Some(State::Storing) => self.handle_storing(line),
        };
        if let Some(event) = event {
            let end = self.log.len();
            self.events.push((event, self.last_event_end, end));
            self.last_event_end = end;
        }
        event
    }

    fn handle_starting(&mut self, line: &str) -> Option<TrainEvent> {
        if line.starts_with("Feature generation") {
            self.state = Some(State::Featgen);
        }
        None
    }

    fn handle_featgen(&mut self, line: &str) -> Option<TrainEvent> {
        if !line.is_empty() && line.chars().all(|c| c.is_ascii_digit() || c == '.') {
            self.featgen_percent = match line.parse::<u32>() {
                Ok(tens) => tens * 10,
                Err(_) => self.featgen_percent + 2 * line.len() as u32,
            };
            return Some(TrainEvent::FeatgenProgress);
        }
        if let Some(caps) = NUM_FEATURES.captures(line) {
            self.featgen_num_features = caps[1].parse().ok();
            return None;
        }
        if let Some(caps) = SECONDS.captures(line) {
            self.featgen_seconds = caps[1].parse().ok();
            self.state = Some(State::AfterFeatgen);
            return Some(TrainEvent::FeatgenEnd);
        }
        None
    }

    fn handle_after_featgen(&mut self, line: &str) -> Option<TrainEvent> {
        if ITERATION_HEAD.is_match(line) {
            self.state = Some(State::Iteration);
            self.handle_iteration(line);
            return Some(TrainEvent::Prepared);
        }
        if line.contains("terminated with error") {
            self.state = Some(State::AfterIteration);
            return Some(TrainEvent::PrepareError);
        }
        None
    }

    fn handle_iteration(&mut self, line: &str) -> Option<TrainEvent> {
        if let Some(caps) = ITERATION_HEAD.captures(line) {
            self.iterations.push(Iteration {
                num: caps[1].parse().unwrap_or(0),
                ..Default::default()
            });
            return None;
        }
        if line.is_empty() {
            self.state = Some(State::AfterIteration);
            return Some(TrainEvent::Iteration);
        }
        if let Some(iteration) = self.iterations.last_mut() {
            iteration.update(line);
        }
        None
    }

    fn handle_after_iteration(&mut self, line: &str) -> Option<TrainEvent> {
        if ITERATION_HEAD.is_match(line) {
            self.state = Some(State::Iteration);
            return self.handle_iteration(line);
        }
        if let Some(caps) = TRAINING_SECONDS.captures(line) {
            self.training_seconds = caps[1].parse().ok();
        }
        if line.starts_with("Storing the model") {
            self.state = Some(State::Storing);
            return Some(TrainEvent::OptimizationEnd);
        }
        None
    }

    fn handle_storing(&mut self, line: &str) -> Option<TrainEvent> {
        if line.is_empty() {
            return Some(TrainEvent::End);
        }
        if let Some(caps) = SECONDS.captures(line) {
            self.storing_seconds = caps[1].parse().ok();
        }
        None
    }

    /// The most recent complete iteration report
    pub fn last_iteration(&self) -> Option<&Iteration> {
        self.iterations.last()
    }

    /// All messages fed so far, concatenated
    pub fn log(&self) -> String {
        self.log.concat()
    }

    /// Messages that led to the most recent event
    pub fn last_log(&self) -> String {
        match self.events.last() {
            Some(&(_, start, end)) => self.log[start..end].concat(),
            None => String::new(),
        }
    }
}
