//! Price source adapters.

mod yahoo;

pub use yahoo::YahooSource;
