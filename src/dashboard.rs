use std::future::Future;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::ApiClient;
use crate::cache::CacheStore;
use crate::error::DashboardError;
use crate::models::{Cycle, InitialData, NationalEri, Record, SchoolEri, Scope};

/// Initial dashboard payload with records validated at the fetch boundary.
/// The embedded ERI values are the initial load's copies; the dedicated
/// endpoints are authoritative and these serve as fallbacks.
pub struct Overview {
    pub records: Vec<Record>,
    pub national_benchmark: Option<Record>,
    pub school_eri: Option<SchoolEri>,
    pub national_eri: Option<NationalEri>,
}

impl Overview {
    fn from_initial(data: InitialData) -> Overview {
        let records: Vec<Record> = data
            .vespa_results
            .iter()
            .filter_map(Record::from_raw)
            .collect();
        let dropped = data.vespa_results.len() - records.len();
        if dropped > 0 {
            debug!("dropped {dropped} malformed records at the fetch boundary");
        }

        Overview {
            records,
            national_benchmark: data.national_benchmark.as_ref().and_then(Record::from_raw),
            school_eri: data.school_eri,
            national_eri: data.national_eri,
        }
    }
}

/// Session state for one dashboard view: the data scope, the selected cycle,
/// and the shared cache. Scope and cycle changes clear the cache so stale
/// aggregates are never reused across scope boundaries.
pub struct DashboardContext {
    api: ApiClient,
    cache: CacheStore,
    scope: Scope,
    cycle: Cycle,
}

impl DashboardContext {
    pub fn new(api: ApiClient, cache: CacheStore, scope: Scope, cycle: Cycle) -> DashboardContext {
        DashboardContext {
            api,
            cache,
            scope,
            cycle,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    pub async fn set_cycle(&mut self, cycle: Cycle) {
        if cycle != self.cycle {
            self.cycle = cycle;
            self.cache.clear().await;
        }
    }

    pub async fn set_scope(&mut self, scope: Scope) {
        if scope != self.scope {
            self.scope = scope;
            self.cache.clear().await;
            self.record_visit();
        }
    }

    /// Manual refresh: drop everything cached for this namespace.
    pub async fn refresh(&self) {
        self.cache.clear().await;
    }

    /// Notes an establishment visit in the recently-viewed list. Staff-admin
    /// scopes are not tracked; the list exists for switching establishments.
    pub fn record_visit(&self) {
        if let Scope::Establishment(id) = &self.scope {
            self.cache.push_recent_establishment(id);
        }
    }

    pub async fn load_overview(&self) -> Result<Overview, DashboardError> {
        let key = format!(
            "initial_data_{}_cycle{}",
            self.scope.cache_fragment(),
            self.cycle.number()
        );
        let data = self
            .load_cached(&key, self.api.initial_data(&self.scope, self.cycle))
            .await?;
        Ok(Overview::from_initial(data))
    }

    pub async fn load_school_eri(&self) -> Result<SchoolEri, DashboardError> {
        let key = format!(
            "school_eri_{}_cycle{}",
            self.scope.cache_fragment(),
            self.cycle.number()
        );
        self.load_cached(&key, self.api.school_eri(&self.scope, self.cycle))
            .await
    }

    pub async fn load_national_eri(&self) -> Result<NationalEri, DashboardError> {
        let key = format!("national_eri_cycle{}", self.cycle.number());
        self.load_cached(&key, self.api.national_eri(self.cycle))
            .await
    }

    /// Cache-first load: check the cache, wait out an in-flight fetch and
    /// re-check, then fetch and store. A fetch that resolves after the cache
    /// generation moved on (scope or cycle switch) skips its write so a stale
    /// response cannot overwrite fresh state.
    async fn load_cached<T, Fut>(&self, key: &str, fetch: Fut) -> Result<T, DashboardError>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = Result<T, DashboardError>>,
    {
        if let Some(data) = self.read_cache(key).await {
            return Ok(data);
        }

        if self.cache.is_loading() && self.cache.wait_for_inflight().await {
            if let Some(data) = self.read_cache(key).await {
                return Ok(data);
            }
        }

        let generation = self.cache.generation();
        self.cache.begin_fetch();
        let result = fetch.await;
        self.cache.finish_fetch();
        let data = result?;

        if self.cache.generation() == generation {
            match serde_json::to_value(&data) {
                Ok(value) => self.cache.set(key, value).await,
                Err(err) => warn!("failed to serialize {key} for caching: {err}"),
            }
        } else {
            debug!("scope changed while fetching {key}; skipping cache write");
        }
        Ok(data)
    }

    async fn read_cache<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.cache.get(key).await?;
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!("cached payload for {key} failed to decode: {err}");
                None
            }
        }
    }
}
