//! Probabilistic loss and corruption decisions.
//!
//! Both endpoints deliberately drop and corrupt traffic to exercise the
//! recovery logic.  A [`FaultInjector`] turns percentages into yes/no
//! decisions using one uniform draw in `[1, 100]` per decision:
//!
//! | Decision                         | True when              |
//! |----------------------------------|------------------------|
//! | [`FaultInjector::should_deliver`]| `draw >= loss_percent`, never at 100% |
//! | [`FaultInjector::should_corrupt`]| `draw <= percent`      |
//!
//! So a loss of 0% always delivers, 100% always drops, and a corruption of
//! 0% never corrupts.
//!
//! The draws come from a [`DrawSource`].  Production uses [`RandomDraws`]
//! (optionally seeded); tests substitute [`ScriptedDraws`] for exact,
//! reproducible fault patterns.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Supplies uniform integers in `[1, 100]`.
pub trait DrawSource: Send {
    fn draw_percent(&mut self) -> u8;
}

/// Draws from a standard RNG.
#[derive(Debug)]
pub struct RandomDraws {
    rng: StdRng,
}

impl RandomDraws {
    /// Seeded from the operating system.
    pub fn from_os() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible sequence of draws.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl DrawSource for RandomDraws {
    fn draw_percent(&mut self) -> u8 {
        self.rng.random_range(1..=100)
    }
}

/// Replays a fixed script of draws, then repeats `fallback` forever.
#[derive(Debug, Clone)]
pub struct ScriptedDraws {
    script: VecDeque<u8>,
    fallback: u8,
}

impl ScriptedDraws {
    pub fn new(script: impl IntoIterator<Item = u8>, fallback: u8) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback,
        }
    }

    /// Every draw is `value`.
    pub fn constant(value: u8) -> Self {
        Self::new([], value)
    }
}

impl DrawSource for ScriptedDraws {
    fn draw_percent(&mut self) -> u8 {
        self.script.pop_front().unwrap_or(self.fallback)
    }
}

/// Loss/corruption decision maker owned by a single task.
pub struct FaultInjector {
    source: Box<dyn DrawSource>,
}

impl FaultInjector {
    pub fn new(source: impl DrawSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// Injector for one task of an endpoint.
    ///
    /// With a seed, each `stream` gets its own reproducible sequence so the
    /// tasks of one endpoint draw independently.
    pub fn from_seed(seed: Option<u64>, stream: u64) -> Self {
        match seed {
            Some(seed) => Self::new(RandomDraws::seeded(seed.wrapping_add(stream))),
            None => Self::new(RandomDraws::from_os()),
        }
    }

    /// Never loses and never corrupts.
    pub fn reliable() -> Self {
        // 100 passes every loss check and fails every corruption check
        // below 100%.
        Self::new(ScriptedDraws::constant(100))
    }

    /// `false` simulates the unit never arriving.
    pub fn should_deliver(&mut self, loss_percent: u8) -> bool {
        let draw = self.source.draw_percent();
        // A draw of 100 would otherwise slip through a 100% loss setting.
        loss_percent < 100 && draw >= loss_percent
    }

    /// `true` means the unit goes out with a bad checksum flag.
    pub fn should_corrupt(&mut self, corrupt_percent: u8) -> bool {
        corrupt_percent >= self.source.draw_percent()
    }
}

impl std::fmt::Debug for FaultInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultInjector").finish_non_exhaustive()
    }
}
