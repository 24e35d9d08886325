//! Phrase banks for the acknowledgment prefix, and the randomness they
//! draw from.

use std::collections::VecDeque;

use llamaskill_config::GateConfig;
use rand::Rng;

/// Source of uniform choices.
pub trait RandomSource: Send {
    /// Return an index in `0..len`. `len` is never 0.
    fn pick(&mut self, len: usize) -> usize;
}

/// Thread-local RNG; the production source.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn pick(&mut self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Replays a fixed sequence of indices, cycling when exhausted.
///
/// Indices are reduced modulo the bank length. Useful for reproducible
/// replies in tests and demos.
#[derive(Debug, Clone)]
pub struct FixedChoices {
    choices: VecDeque<usize>,
}

impl FixedChoices {
    pub fn new(choices: impl IntoIterator<Item = usize>) -> Self {
        let mut choices: VecDeque<usize> = choices.into_iter().collect();
        if choices.is_empty() {
            choices.push_back(0);
        }
        Self { choices }
    }
}

impl RandomSource for FixedChoices {
    fn pick(&mut self, len: usize) -> usize {
        let next = self.choices.pop_front().unwrap_or(0);
        self.choices.push_back(next);
        next % len
    }
}

/// The two phrase banks a topic acknowledgment is built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhraseBanks {
    openers: Vec<String>,
    follow_ups: Vec<String>,
}

impl PhraseBanks {
    pub fn new(openers: Vec<String>, follow_ups: Vec<String>) -> Self {
        Self {
            openers,
            follow_ups,
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.openers.clone(), config.follow_ups.clone())
    }

    /// `<opener><word>. <follow-up>`, each bank sampled independently.
    pub fn acknowledge(&self, word: &str, rng: &mut dyn RandomSource) -> String {
        let opener = choose(&self.openers, rng);
        let follow_up = choose(&self.follow_ups, rng);
        format!("{opener}{word}. {follow_up}")
    }
}

fn choose<'a>(bank: &'a [String], rng: &mut dyn RandomSource) -> &'a str {
    match bank.len() {
        0 => "",
        len => bank[rng.pick(len)].as_str(),
    }
}
