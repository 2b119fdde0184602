//! Cartesian-product sweeps over experiment parameters.

use crate::{Error, Result};
use crate::range::{RangeSpec, Scale};

/// One independently varied parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    name: &'static str,
    range: RangeSpec,
    scale: Scale,
}

impl Axis {
    pub fn linear(name: &'static str, range: RangeSpec) -> Axis {
        Axis { name, range, scale: Scale::Linear }
    }

    /// Log-scaled axis; fails if either endpoint is not positive.
    pub fn log(name: &'static str, range: RangeSpec) -> Result<Axis> {
        Scale::Log.validate(&range)?;
        Ok(Axis { name, range, scale: Scale::Log })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn range(&self) -> &RangeSpec {
        &self.range
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn len(&self) -> usize {
        self.range.count
    }

    pub fn is_empty(&self) -> bool {
        self.range.count == 0
    }

    pub fn value(&self, index: usize) -> f64 {
        self.scale.resolve(&self.range, index)
    }
}

/// Parameter values of one measurement point, in axis order.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    /// Position of this point in the sweep, starting at zero.
    pub index: usize,
    pub total: usize,
    pub values: Vec<f64>,
}

impl SweepPoint {
    pub fn progress(&self) -> f64 {
        progress_percent(self.index, self.total)
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total
    }
}

/// Completion of point `index` out of `total` in percent; a lone point is immediately 100%.
pub fn progress_percent(index: usize, total: usize) -> f64 {
    if total <= 1 {
        return 100.0
    }
    100.0 * index as f64 / (total - 1) as f64
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sweep {
    axes: Vec<Axis>,
    len: usize,
}

impl Sweep {
    /// Fails if the number of points does not fit in `usize`.
    pub fn new(axes: Vec<Axis>) -> Result<Sweep> {
        let len = axes.iter().try_fold(1usize, |len, axis| len.checked_mul(axis.len()))
            .ok_or_else(|| Error::InvalidRange(format!("sweep over {} has too many points",
                axes.iter().map(|axis| format!("{}={}", axis.name, axis.range))
                    .collect::<Vec<_>>().join(" "))))?;
        Ok(Sweep { axes, len })
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes[..]
    }

    /// Number of measurement points.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn point(&self, index: usize, total: usize) -> SweepPoint {
        // mixed-radix decomposition with the last axis as the least significant digit
        let mut remainder = index;
        let mut values = vec![0.0; self.axes.len()];
        for (value, axis) in values.iter_mut().zip(self.axes.iter()).rev() {
            *value = axis.value(remainder % axis.len());
            remainder /= axis.len();
        }
        SweepPoint { index, total, values }
    }

    /// Every point, with the first axis varying slowest and the last axis fastest.
    pub fn points(&self) -> impl Iterator<Item = SweepPoint> + '_ {
        let total = self.len();
        (0..total).map(move |index| self.point(index, total))
    }

    /// Call `body` for every point in order, stopping at the first error.
    pub fn run<F>(&self, mut body: F) -> Result<()>
        where F: FnMut(&SweepPoint) -> Result<()>
    {
        log::info!("sweep: {} points over {}", self.len(),
            self.axes.iter().map(|axis| format!("{}={}", axis.name, axis.range))
                .collect::<Vec<_>>().join(" "));
        for point in self.points() {
            log::debug!("sweep: point {}/{} {:?}", point.index + 1, point.total, point.values);
            body(&point)?;
        }
        log::info!("sweep: done");
        Ok(())
    }
}
