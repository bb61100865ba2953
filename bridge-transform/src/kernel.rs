//! Pure spikes<->rate numeric kernels. No I/O, no shared state: both
//! functions take exactly the values they need and return the result.

use rand::Rng;

/// 1 ms rectangular kernel width, matching the resolution of the
/// original convolution kernel used to smooth a spike train into an
/// instantaneous rate.
const KERNEL_WIDTH_MS: f64 = 1.0;
/// Divisor applied to the mean rate across neurons; named `adaptation`
/// in the upstream plugin this kernel replaces.
const ADAPTATION_CONSTANT: f64 = 10.0;
/// Padding added to the window's upper bound so the final sample at
/// exactly `t_stop` is still admitted by a half-open interval.
const T_STOP_PAD_MS: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ms: f64,
    pub end_ms: f64,
}

/// Buckets `spikes[0..size)` (flat `(device_id, neuron_id, time)`
/// triples) per neuron, convolves each neuron's train with a 1 ms
/// rectangular kernel sampled every `resolution_ms` across
/// `[count*window_ms, (count+1)*window_ms]`, and reduces across neurons
/// by arithmetic mean divided by the adaptation constant.
///
/// `neuron_id` is an absolute NEST id; `first_id` is subtracted from it
/// before use as an index, matching `spikes_neurons[id_neurons -
/// self.__first_id]` in the original `Spiketrain_to_rate.py`. Ids that
/// fall outside `[first_id, first_id + nb_neurons)` once offset are
/// ignored rather than treated as fatal, since a malformed id does not
/// invalidate the rest of the step's payload.
pub fn spikes_to_rate(
    count: u64,
    spikes: &[f64],
    size: usize,
    nb_neurons: usize,
    first_id: i64,
    window_ms: f64,
    resolution_ms: f64,
) -> (TimeWindow, Vec<f64>) {
    let t_start = count as f64 * window_ms;
    let t_stop = (count + 1) as f64 * window_ms + T_STOP_PAD_MS;

    let mut per_neuron: Vec<Vec<f64>> = vec![Vec::new(); nb_neurons.max(1)];
    for triple in spikes[..size.min(spikes.len())].chunks_exact(3) {
        let [_device_id, neuron_id, time] = [triple[0], triple[1], triple[2]];
        let relative = neuron_id as i64 - first_id;
        if let Ok(idx) = usize::try_from(relative) {
            if idx < per_neuron.len() && time >= t_start && time < t_stop {
                per_neuron[idx].push(time);
            }
        }
    }

    let n_samples = ((window_ms / resolution_ms).ceil() as usize).max(1);
    let mut rates = vec![0.0f64; n_samples];
    let half_kernel = KERNEL_WIDTH_MS / 2.0;

    for train in &per_neuron {
        for (i, rate) in rates.iter_mut().enumerate() {
            let sample_t = t_start + i as f64 * resolution_ms;
            let count_in_kernel = train
                .iter()
                .filter(|&&t| (t - sample_t).abs() <= half_kernel)
                .count();
            // events per ms -> Hz
            *rate += count_in_kernel as f64 / KERNEL_WIDTH_MS * 1000.0;
        }
    }
    let neurons = per_neuron.len() as f64;
    for rate in &mut rates {
        *rate = (*rate / neurons) / ADAPTATION_CONSTANT;
    }

    (
        TimeWindow {
            start_ms: t_start,
            end_ms: (count + 1) as f64 * window_ms,
        },
        rates,
    )
}

/// Generates `nb_trains` independent inhomogeneous Poisson spike trains
/// over `[window.start_ms, window.end_ms]` from the piecewise-constant
/// rate function sampled every `resolution_ms` in `rates` (Hz), using
/// the thinning algorithm: draw candidates from a homogeneous process at
/// the window's peak rate, then keep each candidate with probability
/// `rate(t) / peak_rate`.
///
/// This direction is not present in the retained reference sources
/// (only the spikes-to-rate conversion survived there); the thinning
/// construction is the standard technique for sampling an inhomogeneous
/// Poisson process from a bounded rate function.
pub fn rate_to_spikes(
    window: TimeWindow,
    rates: &[f64],
    resolution_ms: f64,
    nb_trains: usize,
    rng: &mut impl Rng,
) -> Vec<Vec<f64>> {
    if rates.is_empty() || window.end_ms <= window.start_ms {
        return vec![Vec::new(); nb_trains];
    }
    // Hz -> events per ms.
    let peak_ms = rates.iter().cloned().fold(0.0f64, f64::max) / 1000.0;
    if peak_ms <= 0.0 {
        return vec![Vec::new(); nb_trains];
    }

    (0..nb_trains)
        .map(|_| thin_one_train(window, rates, resolution_ms, peak_ms, rng))
        .collect()
}

fn thin_one_train(
    window: TimeWindow,
    rates: &[f64],
    resolution_ms: f64,
    peak_ms: f64,
    rng: &mut impl Rng,
) -> Vec<f64> {
    let mut train = Vec::new();
    let mut t = window.start_ms;
    loop {
        let u: f64 = rng.gen_range(f64::EPSILON..1.0);
        t -= (1.0 - u).ln() / peak_ms;
        if t >= window.end_ms {
            break;
        }
        let sample_idx = (((t - window.start_ms) / resolution_ms) as usize)
            .min(rates.len() - 1);
        let local_rate_ms = rates[sample_idx] / 1000.0;
        let accept_prob = local_rate_ms / peak_ms;
        if rng.gen_range(0.0..1.0) < accept_prob {
            train.push(t);
        }
    }
    train
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn empty_neuron_yields_empty_train() {
        let spikes = [100.0, 0.0, 0.5];
        let (_window, rates) = spikes_to_rate(0, &spikes, spikes.len(), 2, 0, 1.0, 0.1);
        assert_eq!(rates.len(), 10);
        // neuron 1 never spiked, neuron 0 did: mean should still be finite
        assert!(rates.iter().all(|r| r.is_finite()));
    }

    #[test]
    fn spikes_to_rate_is_nonzero_near_spike() {
        let spikes = [100.0, 0.0, 0.5, 100.0, 1.0, 0.7];
        let (window, rates) = spikes_to_rate(0, &spikes, spikes.len(), 2, 0, 1.0, 0.1);
        assert_eq!(window.start_ms, 0.0);
        assert_eq!(window.end_ms, 1.0);
        assert!(rates.iter().any(|&r| r > 0.0));
    }

    #[test]
    fn spikes_to_rate_applies_first_id_offset() {
        // neuron ids are absolute NEST ids starting at 1000; without the
        // offset these would index far past `per_neuron.len()` and be
        // silently dropped.
        let spikes = [100.0, 1000.0, 0.5, 100.0, 1001.0, 0.7];
        let (_window, rates) = spikes_to_rate(0, &spikes, spikes.len(), 2, 1000, 1.0, 0.1);
        assert!(rates.iter().any(|&r| r > 0.0));
    }

    #[test]
    fn spikes_to_rate_ignores_ids_outside_the_population() {
        // id 5 is below first_id 1000, so the offset is negative; id 2000
        // is above the population's range. Neither should panic or be
        // bucketed, and the result is an all-zero rate array.
        let spikes = [100.0, 5.0, 0.5, 100.0, 2000.0, 0.7];
        let (_window, rates) = spikes_to_rate(0, &spikes, spikes.len(), 2, 1000, 1.0, 0.1);
        assert!(rates.iter().all(|&r| r == 0.0));
    }

    #[test]
    fn rate_to_spikes_respects_window() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let window = TimeWindow {
            start_ms: 0.0,
            end_ms: 1.0,
        };
        let rates = vec![50.0; 10];
        let trains = rate_to_spikes(window, &rates, 0.1, 4, &mut rng);
        assert_eq!(trains.len(), 4);
        for train in &trains {
            for &t in train {
                assert!((window.start_ms..window.end_ms).contains(&t));
            }
            assert!(train.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn rate_to_spikes_zero_rate_yields_no_spikes() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let window = TimeWindow {
            start_ms: 0.0,
            end_ms: 1.0,
        };
        let rates = vec![0.0; 10];
        let trains = rate_to_spikes(window, &rates, 0.1, 2, &mut rng);
        assert!(trains.iter().all(Vec::is_empty));
    }

    /// Invariant 4: NEST->TVB->TVB->NEST round trip. A single neuron's
    /// spike train is drawn at a known rate, converted to a rate array,
    /// then re-expanded into spike trains at that same rate; the mean
    /// spike count over many re-expanded trains should land within a few
    /// standard deviations of a Poisson(lambda) count, where lambda is
    /// the rate times the window.
    ///
    /// `spikes_to_rate` divides its averaged rate by `ADAPTATION_CONSTANT`
    /// (a mean-field scaling, not a bug); this test multiplies the
    /// recovered rate back up by that same constant before feeding it to
    /// `rate_to_spikes`, so the comparison is against the rate the input
    /// train was actually drawn at.
    #[test]
    fn round_trip_preserves_spike_count_within_poisson_tolerance() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let window = TimeWindow {
            start_ms: 0.0,
            end_ms: 200.0,
        };
        let resolution_ms = 1.0;
        let window_ms = 200.0;
        let input_rate_hz = 50.0;

        let original = thin_one_train(
            window,
            &vec![input_rate_hz; 200],
            resolution_ms,
            input_rate_hz / 1000.0,
            &mut rng,
        );
        let original_count = original.len();

        let mut spikes = Vec::with_capacity(original.len() * 3);
        for &t in &original {
            spikes.extend_from_slice(&[0.0, 0.0, t]);
        }

        let (recovered_window, rates) =
            spikes_to_rate(0, &spikes, spikes.len(), 1, 0, window_ms, resolution_ms);
        assert_eq!(recovered_window.start_ms, window.start_ms);
        assert_eq!(recovered_window.end_ms, window.end_ms);

        let rescaled: Vec<f64> = rates.iter().map(|r| r * ADAPTATION_CONSTANT).collect();

        const TRIALS: usize = 200;
        let total: usize = (0..TRIALS)
            .map(|_| {
                thin_one_train(
                    recovered_window,
                    &rescaled,
                    resolution_ms,
                    rescaled.iter().cloned().fold(0.0f64, f64::max) / 1000.0,
                    &mut rng,
                )
                .len()
            })
            .sum();
        let mean_recovered = total as f64 / TRIALS as f64;

        let lambda = input_rate_hz / 1000.0 * window_ms;
        let tolerance = 4.0 * lambda.sqrt();
        assert!(
            (mean_recovered - original_count as f64).abs() <= tolerance,
            "mean recovered count {mean_recovered} vs original {original_count}, \
             tolerance {tolerance}"
        );
    }
}
