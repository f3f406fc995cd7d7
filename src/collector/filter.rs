//! Which containers a scrape reports on.

use ahash::AHashSet as HashSet;
use thiserror::Error;
use tracing::{debug, info};

use crate::runtime::ContainerRecord;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("configured services not found among containers: {}", .0.join(", "))]
    UnknownServices(Vec<String>),
}

/// Inclusion policy: either every container, or an explicit allow-list of
/// display names.
///
/// An empty allow-list always means collect-all, whatever the flag says.
#[derive(Debug, Clone)]
pub struct ServiceFilter {
    collect_all: bool,
    services: HashSet<String>,
}

impl ServiceFilter {
    /// Builds the filter and checks every allow-listed name against the
    /// current inventory.
    pub fn new(
        services: &[String],
        collect_all: bool,
        inventory: &[ContainerRecord],
    ) -> Result<Self, FilterError> {
        let services: HashSet<String> = services
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let collect_all = collect_all || services.is_empty();

        if collect_all {
            info!("Collecting metrics for all containers");
            return Ok(Self {
                collect_all,
                services,
            });
        }

        let known: HashSet<&str> = inventory.iter().map(|c| c.name.as_str()).collect();
        let mut missing: Vec<String> = services
            .iter()
            .filter(|s| !known.contains(s.as_str()))
            .cloned()
            .collect();

        if !missing.is_empty() {
            missing.sort();
            return Err(FilterError::UnknownServices(missing));
        }

        info!("Collecting metrics for {} services", services.len());
        debug!("Service allow-list: {:?}", services);

        Ok(Self {
            collect_all,
            services,
        })
    }

    pub fn collect_all(&self) -> bool {
        self.collect_all
    }

    pub fn includes(&self, name: &str) -> bool {
        self.collect_all || self.services.contains(name)
    }
}
