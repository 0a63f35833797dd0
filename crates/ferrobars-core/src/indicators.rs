use crate::{PriceBar, STORED_EMA_WINDOWS};

/// Default EMA windows: the ones with a column in the store.
pub const DEFAULT_EMA_WINDOWS: [u32; 3] = STORED_EMA_WINDOWS;

/// Exponential moving average, updated one observation at a time.
///
///   bar 0  -> value = price
///   bar 1+ -> value = alpha * price + (1 - alpha) * prev, alpha = 2 / (window + 1)
///
/// The seed is the first observation, not a simple average of the first
/// `window` prices, so the value is defined from the first bar onwards.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(window: u32) -> Self {
        Self {
            alpha: 2.0 / (f64::from(window) + 1.0),
            value: None,
        }
    }

    /// Feed one price, return the current EMA value.
    pub fn update(&mut self, price: f64) -> f64 {
        let next = match self.value {
            None => price,
            Some(prev) => self.alpha * price + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// Populate `ema{w}` on every bar for each window.
///
/// `bars` must be a single symbol's series in ascending time order.
/// Windows are independent of each other. Existing values are overwritten.
pub fn add_indicators(bars: &mut [PriceBar], windows: &[u32]) {
    if bars.is_empty() {
        return;
    }

    for &window in windows {
        let mut ema = Ema::new(window);
        for bar in bars.iter_mut() {
            let value = ema.update(bar.close);
            bar.set_ema(window, value);
        }
    }
}
