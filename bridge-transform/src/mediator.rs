use bridge_buffer::SharedBuffer;
use rand::Rng;

use crate::{
    error::TransformError,
    kernel::{self, TimeWindow},
};

/// Routes transform calls to the numeric kernel and owns the run-scoped
/// step counter. No other component advances `count`; the directional
/// pipeline only ever calls [`Mediator::advance`] after a successful
/// emit.
pub struct Mediator {
    count: u64,
    window_ms: f64,
    resolution_ms: f64,
    nb_neurons: usize,
    first_id: i64,
}

impl Mediator {
    pub fn new(
        window_ms: f64,
        resolution_ms: f64,
        nb_neurons: usize,
        first_id: i64,
    ) -> Self {
        Self {
            count: 0,
            window_ms,
            resolution_ms,
            nb_neurons,
            first_id,
        }
    }

    pub fn step(&self) -> u64 {
        self.count
    }

    pub fn advance(&mut self) {
        self.count += 1;
    }

    /// Reads the header and payload up to it from `buffer` and converts
    /// the spike triples into a per-window rate array.
    pub fn spikes_to_rate(
        &self,
        buffer: &SharedBuffer,
    ) -> Result<(TimeWindow, Vec<f64>), TransformError> {
        let size = buffer.get_header().max(0) as usize;
        let spikes = buffer.get_slice(0, size)?;
        Ok(kernel::spikes_to_rate(
            self.count,
            &spikes,
            size,
            self.nb_neurons,
            self.first_id,
            self.window_ms,
            self.resolution_ms,
        ))
    }

    /// Reads `[t_start, t_end]` from the first two cells and the rate
    /// samples up to the header from the rest of `buffer`, then draws
    /// `nb_trains` independent spike trains from that rate function.
    pub fn rate_to_spikes(
        &self,
        buffer: &SharedBuffer,
        nb_trains: usize,
        rng: &mut impl Rng,
    ) -> Result<Vec<Vec<f64>>, TransformError> {
        let bounds = buffer.get_slice(0, 2)?;
        let window = TimeWindow {
            start_ms: bounds[0],
            end_ms: bounds[1],
        };
        let size = buffer.get_header().max(0) as usize;
        let rates = buffer.get_slice(2, size)?;
        Ok(kernel::rate_to_spikes(
            window,
            &rates,
            self.resolution_ms,
            nb_trains,
            rng,
        ))
    }
}
