//! Latest observed price per symbol

use crate::feed::PriceSample;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct LatestValueCache {
    values: RwLock<HashMap<String, Decimal>>,
}

impl LatestValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the cached price of every symbol in `samples`
    pub async fn update(&self, samples: &[PriceSample]) {
        let mut values = self.values.write().await;
        for sample in samples {
            values.insert(sample.symbol.clone(), sample.price);
        }
    }

    pub async fn get(&self, symbol: &str) -> Option<Decimal> {
        self.values.read().await.get(symbol).copied()
    }

    /// Read all `symbols` at once, or return the ones with no cached value
    pub async fn select(&self, symbols: &[String]) -> Result<BTreeMap<String, Decimal>, Vec<String>> {
        let values = self.values.read().await;
        let mut selected = BTreeMap::new();
        let mut missing = Vec::new();

        for symbol in symbols {
            match values.get(symbol) {
                Some(price) => {
                    selected.insert(symbol.clone(), *price);
                }
                None => missing.push(symbol.clone()),
            }
        }

        if missing.is_empty() {
            Ok(selected)
        } else {
            Err(missing)
        }
    }
}
