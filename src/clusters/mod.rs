// src/clusters/mod.rs

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::households::IndexedHousehold;

/// Cluster-level summary of household wealth.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAggregate {
    pub year: i16,
    pub cluster: String,
    /// Sampling-weighted mean of the household wealth index.
    pub wealth_index: f64,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    /// Number of contributing households.
    pub size: i64,
}

impl ClusterAggregate {
    /// Image file stem, `{year}_{cluster}`.
    pub fn filename(&self) -> String {
        format!("{}_{}", self.year, self.cluster)
    }
}

#[derive(Default)]
struct Acc {
    weighted: f64,
    weights: f64,
    lon: (f64, usize),
    lat: (f64, usize),
    size: i64,
}

fn mean((sum, count): (f64, usize)) -> Option<f64> {
    (count > 0).then(|| sum / count as f64)
}

/// Group by (year, cluster), ordered by key.
#[instrument(level = "info", skip(households), fields(n = households.len()))]
pub fn aggregate_clusters(households: &[IndexedHousehold]) -> Result<Vec<ClusterAggregate>> {
    let mut groups: BTreeMap<(i16, &str), Acc> = BTreeMap::new();

    for h in households {
        let key = &h.household.key;
        let acc = groups.entry((key.year, key.cluster.as_str())).or_default();
        match h.household.sampling_weight {
            Some(w) => {
                acc.weighted += h.wealth_index * w;
                acc.weights += w;
            }
            None => warn!(?key, "household without sampling weight left out of weighted mean"),
        }
        if let Some(lon) = h.household.longitude {
            acc.lon.0 += lon;
            acc.lon.1 += 1;
        }
        if let Some(lat) = h.household.latitude {
            acc.lat.0 += lat;
            acc.lat.1 += 1;
        }
        acc.size += 1;
    }

    let mut out = Vec::with_capacity(groups.len());
    for ((year, cluster), acc) in groups {
        if acc.weights == 0.0 {
            bail!("weights of cluster {} ({}) sum to zero", cluster, year);
        }
        out.push(ClusterAggregate {
            year,
            cluster: cluster.to_string(),
            wealth_index: acc.weighted / acc.weights,
            longitude: mean(acc.lon),
            latitude: mean(acc.lat),
            size: acc.size,
        });
    }

    info!(clusters = out.len(), "aggregated clusters");
    Ok(out)
}
