use std::time::Duration;

use crate::config::{BASE_SAMPLE_RATE, BUFFER_SIZE};

/// Samples per signal period that a decimation choice must at least provide.
const OVERSAMPLING: f64 = 20.0;

/// Divider applied to the digitizer clock. Only these values are supported by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Decimation {
    #[default]
    Dec1,
    Dec8,
    Dec64,
    Dec1024,
    Dec8192,
    Dec65536,
}

impl Decimation {
    /// Every supported decimation, finest first.
    pub const ALL: [Decimation; 6] = [
        Self::Dec1, Self::Dec8, Self::Dec64, Self::Dec1024, Self::Dec8192, Self::Dec65536,
    ];

    pub fn factor(self) -> u32 {
        match self {
            Self::Dec1     => 1,
            Self::Dec8     => 8,
            Self::Dec64    => 64,
            Self::Dec1024  => 1024,
            Self::Dec8192  => 8192,
            Self::Dec65536 => 65536,
        }
    }

    pub fn from_factor(factor: u32) -> Option<Decimation> {
        Self::ALL.into_iter().find(|decimation| decimation.factor() == factor)
    }

    /// Effective sample rate in samples per second.
    pub fn sample_rate(self) -> f64 {
        BASE_SAMPLE_RATE / self.factor() as f64
    }

    /// Time it takes to fill one acquisition buffer.
    pub fn buffer_duration(self) -> Duration {
        Duration::from_secs_f64(BUFFER_SIZE as f64 / self.sample_rate())
    }

    /// Choose the largest decimation (longest buffer time) that still samples `frequency`
    /// with at least 20 points per period.
    ///
    /// Frequencies too high to be sampled that densely even without decimation get
    /// `Dec1`; very low, zero, or negative frequencies saturate to `Dec65536`.
    pub fn select(frequency: f64) -> (Decimation, f64) {
        let ideal = BASE_SAMPLE_RATE / (frequency * OVERSAMPLING);
        let decimation = Self::ALL.into_iter().rev()
            .find(|decimation| {
                // zero and negative frequencies produce an infinite or negative ideal;
                // both mean "as slow as possible"
                ideal.is_nan() || ideal < 0.0 || decimation.factor() as f64 <= ideal
            })
            .unwrap_or(Self::Dec1);
        log::trace!("select({} Hz): ideal decimation {}, chose {:?}", frequency, ideal, decimation);
        (decimation, decimation.sample_rate())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_select_boundaries() {
        // 125 MHz / (20 * 1024) = 6103.515625 Hz is exactly representable
        assert_eq!(Decimation::select(6103.515625).0, Decimation::Dec1024);
        assert_eq!(Decimation::select(6103.6).0, Decimation::Dec64);
        assert_eq!(Decimation::select(125e6 / 160.0).0, Decimation::Dec8);
        assert_eq!(Decimation::select(1e6).0, Decimation::Dec1);
        assert_eq!(Decimation::select(50e6).0, Decimation::Dec1);
        assert_eq!(Decimation::select(1.0).0, Decimation::Dec65536);
    }

    #[test]
    fn test_select_sample_rate() {
        let (decimation, sample_rate) = Decimation::select(100e3);
        assert_eq!(decimation, Decimation::Dec8);
        assert_eq!(sample_rate, 125e6 / 8.0);
        assert!(sample_rate >= 20.0 * 100e3);
    }

    #[test]
    fn test_select_degenerate() {
        assert_eq!(Decimation::select(0.0), (Decimation::Dec65536, 125e6 / 65536.0));
        assert_eq!(Decimation::select(-5.0).0, Decimation::Dec65536);
        assert_eq!(Decimation::select(f64::INFINITY).0, Decimation::Dec1);
    }

    #[test]
    fn test_select_monotonic() {
        let mut previous = Decimation::Dec65536;
        let mut frequency = 0.1;
        while frequency < 1e8 {
            let (decimation, _) = Decimation::select(frequency);
            assert!(decimation <= previous, "{} Hz got {:?} after {:?}",
                frequency, decimation, previous);
            previous = decimation;
            frequency *= 1.07;
        }
    }

    #[test]
    fn test_buffer_duration() {
        let nanos = Decimation::Dec8.buffer_duration().as_nanos();
        assert!((1_048_575..=1_048_577).contains(&nanos), "{}", nanos);
        assert_eq!(Decimation::from_factor(8192), Some(Decimation::Dec8192));
        assert_eq!(Decimation::from_factor(3), None);
    }
}
