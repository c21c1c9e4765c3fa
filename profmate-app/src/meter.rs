//! Terminal volume meter.

/// Draw `level` (frame RMS) as a fixed-width bar, scaled by `sensitivity`.
pub fn meter_bar(level: f32, sensitivity: f32, width: usize) -> String {
    let scaled = (level * sensitivity).clamp(0.0, 1.0);
    let filled = (scaled * width as f32).round() as usize;
    format!("{}{}", "█".repeat(filled), "·".repeat(width - filled))
}

/// Forward only every `every`-th level so the log isn't flooded.
#[derive(Debug)]
pub struct Throttle {
    every: u64,
}

impl Throttle {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
        }
    }

    pub fn admits(&self, seq: u64) -> bool {
        seq % self.every == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_an_empty_bar() {
        assert_eq!(meter_bar(0.0, 4.0, 8), "········");
    }

    #[test]
    fn loud_input_saturates() {
        assert_eq!(meter_bar(0.9, 4.0, 4), "████");
        assert_eq!(meter_bar(2.0, 1.0, 4), "████");
    }

    #[test]
    fn bar_scales_with_sensitivity() {
        assert_eq!(meter_bar(0.125, 4.0, 8), "████····");
        assert_eq!(meter_bar(0.125, 1.0, 8), "█·······");
    }

    #[test]
    fn throttle_admits_every_nth() {
        let t = Throttle::new(4);
        let admitted: Vec<u64> = (0..10).filter(|&s| t.admits(s)).collect();
        assert_eq!(admitted, vec![0, 4, 8]);
        assert!(Throttle::new(0).admits(3));
    }
}
