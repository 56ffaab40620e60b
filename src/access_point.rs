//! Registry of externally managed access points.
//!
//! [`AccessPointManager`] keeps the known access points per environment
//! and publishes a DEPLOY / UNDEPLOY event on the access-point topic for
//! every change, so live access-point acceptor groups follow along.

use dashmap::DashMap;

use crate::config::model::AccessPoint;
use crate::event::{Event, EventManager, EventType};

pub struct AccessPointManager {
    events: EventManager,
    by_environment: DashMap<String, Vec<AccessPoint>>,
}

impl AccessPointManager {
    #[must_use]
    pub fn new(events: EventManager) -> Self {
        Self {
            events,
            by_environment: DashMap::new(),
        }
    }

    /// Returns `false` (and publishes nothing) when the access point is already known.
    pub fn register(&self, access_point: AccessPoint) -> bool {
        {
            let mut entries = self
                .by_environment
                .entry(access_point.environment_id.clone())
                .or_default();
            if entries.contains(&access_point) {
                return false;
            }
            entries.push(access_point.clone());
        }

        tracing::info!(
            host = %access_point.host,
            environment = %access_point.environment_id,
            "access point deployed"
        );
        self.events
            .access_points()
            .publish(&Event::new(EventType::Deploy, access_point));
        true
    }

    pub fn unregister(&self, access_point: &AccessPoint) -> bool {
        let removed = self
            .by_environment
            .get_mut(&access_point.environment_id)
            .is_some_and(|mut entries| {
                let before = entries.len();
                entries.retain(|known| known != access_point);
                entries.len() != before
            });

        if removed {
            tracing::info!(
                host = %access_point.host,
                environment = %access_point.environment_id,
                "access point undeployed"
            );
            self.events
                .access_points()
                .publish(&Event::new(EventType::Undeploy, access_point.clone()));
        }
        removed
    }

    #[must_use]
    pub fn get_by_environment_id(&self, environment_id: &str) -> Vec<AccessPoint> {
        self.by_environment
            .get(environment_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn all(&self) -> Vec<AccessPoint> {
        self.by_environment
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }
}
