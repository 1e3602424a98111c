//! Static catalog of classic configuration API families.
//!
//! Each entry describes one name-keyed REST family: its URL path, how list
//! responses are shaped, and the flags the clients and validator dispatch
//! on. The catalog is data, not behavior; the resource clients interpret
//! it. Entries are immutable; [`ApiSpec::apply_parent_object_id`] is the
//! only permitted derivation.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;

/// Post-GET response filter, e.g. stripping volatile metadata the remote
/// adds that would break idempotent re-upload.
pub type TweakResponseFn = fn(Value) -> Value;

/// Semantic equality for duplicate detection when plain name comparison is
/// too strict or too lax for a family.
pub type CheckEqualFn = fn(&Value, &Value) -> bool;

/// One classic-API family.
#[derive(Debug, Clone)]
pub struct ApiSpec {
    pub id: &'static str,
    /// URL path template; may contain `{scope}` for sub-path families.
    pub url_path: Cow<'static, str>,
    /// Property holding the entries of a list response.
    pub list_property: &'static str,
    /// The URL addresses exactly one object; no list/id addressing.
    pub single_configuration: bool,
    /// Multiple remote entities may share a name; identity is an explicit id.
    pub non_unique_name: bool,
    pub skip_download: bool,
    pub non_deletable: bool,
    /// Replacement family, when this one is deprecated.
    pub deprecated_by: Option<&'static str>,
    /// Owning family for sub-path entries (`{scope}` in the path).
    pub parent: Option<&'static str>,
    pub tweak_response: Option<TweakResponseFn>,
    pub check_equal: Option<CheckEqualFn>,
    /// Wait between successive deploys of this family within a component,
    /// for remote ends with eventual-consistency windows.
    pub deploy_wait: Option<Duration>,
}

impl ApiSpec {
    fn new(id: &'static str, url_path: &'static str) -> Self {
        Self {
            id,
            url_path: Cow::Borrowed(url_path),
            list_property: crate::constants::DEFAULT_LIST_PROPERTY,
            single_configuration: false,
            non_unique_name: false,
            skip_download: false,
            non_deletable: false,
            deprecated_by: None,
            parent: None,
            tweak_response: None,
            check_equal: None,
            deploy_wait: None,
        }
    }

    fn list_property(mut self, property: &'static str) -> Self {
        self.list_property = property;
        self
    }

    fn single_configuration(mut self) -> Self {
        self.single_configuration = true;
        self
    }

    fn non_unique_name(mut self) -> Self {
        self.non_unique_name = true;
        self
    }

    fn skip_download(mut self) -> Self {
        self.skip_download = true;
        self
    }

    fn non_deletable(mut self) -> Self {
        self.non_deletable = true;
        self
    }

    fn deprecated_by(mut self, replacement: &'static str) -> Self {
        self.deprecated_by = Some(replacement);
        self
    }

    fn parent(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    fn tweak_response(mut self, f: TweakResponseFn) -> Self {
        self.tweak_response = Some(f);
        self
    }

    fn check_equal(mut self, f: CheckEqualFn) -> Self {
        self.check_equal = Some(f);
        self
    }

    fn deploy_wait(mut self, wait: Duration) -> Self {
        self.deploy_wait = Some(wait);
        self
    }

    /// Whether this family nests under a parent object in the URL.
    #[must_use]
    pub fn has_scope_placeholder(&self) -> bool {
        self.url_path.contains("{scope}")
    }

    /// Derives a concrete entry with `{scope}` replaced by the resolved
    /// parent object id. The only permitted mutation of a catalog entry.
    #[must_use]
    pub fn apply_parent_object_id(&self, parent_id: &str) -> Self {
        let mut derived = self.clone();
        derived.url_path = Cow::Owned(
            self.url_path
                .replace("{scope}", &urlencoding::encode(parent_id)),
        );
        derived
    }
}

/// Strips remote bookkeeping from dashboard GETs; the server injects it
/// and rejects uploads that echo it back.
fn strip_dashboard_metadata(mut payload: Value) -> Value {
    if let Some(object) = payload.as_object_mut() {
        object.remove("metadata");
    }
    payload
}

/// Dashboards with equal name and owner are the same dashboard, whatever
/// the rest of the payload says.
fn dashboards_equal(a: &Value, b: &Value) -> bool {
    let key = |v: &Value| {
        (
            v.pointer("/dashboardMetadata/name")
                .and_then(Value::as_str)
                .map(str::to_string),
            v.pointer("/dashboardMetadata/owner")
                .and_then(Value::as_str)
                .map(str::to_string),
        )
    };
    key(a) == key(b)
}

static CATALOG: Lazy<IndexMap<&'static str, ApiSpec>> = Lazy::new(|| {
    let specs = vec![
        ApiSpec::new("alerting-profile", "/api/config/v1/alertingProfiles"),
        ApiSpec::new("management-zone", "/api/config/v1/managementZones"),
        ApiSpec::new("auto-tag", "/api/config/v1/autoTags"),
        ApiSpec::new("notification", "/api/config/v1/notifications"),
        ApiSpec::new("maintenance-window", "/api/config/v1/maintenanceWindows"),
        ApiSpec::new("dashboard", "/api/config/v1/dashboards")
            .list_property("dashboards")
            .non_unique_name()
            .tweak_response(strip_dashboard_metadata)
            .check_equal(dashboards_equal),
        ApiSpec::new("request-naming-service", "/api/config/v1/service/requestNaming")
            .non_unique_name(),
        ApiSpec::new("app-detection-rule", "/api/config/v1/applicationDetectionRules")
            .deploy_wait(Duration::from_secs(1)),
        ApiSpec::new("application-web", "/api/config/v1/applications/web"),
        ApiSpec::new("application-mobile", "/api/config/v1/applications/mobile"),
        ApiSpec::new(
            "key-user-actions-mobile",
            "/api/config/v1/applications/mobile/{scope}/keyUserActions",
        )
        .parent("application-mobile")
        .non_deletable(),
        ApiSpec::new("synthetic-monitor", "/api/v1/synthetic/monitors").list_property("monitors"),
        ApiSpec::new("synthetic-location", "/api/v1/synthetic/locations")
            .list_property("locations")
            .skip_download(),
        ApiSpec::new(
            "anomaly-detection-applications",
            "/api/config/v1/anomalyDetection/applications",
        )
        .single_configuration()
        .non_deletable(),
        ApiSpec::new(
            "anomaly-detection-services",
            "/api/config/v1/anomalyDetection/services",
        )
        .single_configuration()
        .non_deletable(),
        ApiSpec::new(
            "service-detection-full-web-request",
            "/api/config/v1/service/detectionRules/FULL_WEB_REQUEST",
        )
        .deprecated_by("settings"),
        ApiSpec::new("credential-vault", "/api/config/v1/credentials")
            .list_property("credentials")
            .skip_download(),
    ];

    specs.into_iter().map(|spec| (spec.id, spec)).collect()
});

/// The full catalog, keyed by family id, in declaration order.
#[must_use]
pub fn catalog() -> &'static IndexMap<&'static str, ApiSpec> {
    &CATALOG
}

/// Looks up one family.
#[must_use]
pub fn lookup(id: &str) -> Option<&'static ApiSpec> {
    CATALOG.get(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_finds_known_families() {
        let spec = lookup("alerting-profile").unwrap();
        assert_eq!(spec.url_path, "/api/config/v1/alertingProfiles");
        assert_eq!(spec.list_property, "values");
    }

    #[test]
    fn unknown_family_is_absent() {
        assert!(lookup("no-such-family").is_none());
    }

    #[test]
    fn single_configuration_and_non_unique_name_never_combine() {
        for spec in catalog().values() {
            assert!(
                !(spec.single_configuration && spec.non_unique_name),
                "{} combines single-configuration with non-unique-name",
                spec.id
            );
        }
    }

    #[test]
    fn parents_resolve_to_catalog_entries() {
        for spec in catalog().values() {
            if let Some(parent) = spec.parent {
                assert!(lookup(parent).is_some(), "{}: unknown parent {parent}", spec.id);
            }
            assert_eq!(
                spec.parent.is_some(),
                spec.has_scope_placeholder(),
                "{}: parent and {{scope}} placeholder must agree",
                spec.id
            );
        }
    }

    #[test]
    fn paths_are_rooted() {
        for spec in catalog().values() {
            assert!(spec.url_path.starts_with('/'), "{}: {}", spec.id, spec.url_path);
        }
    }

    #[test]
    fn apply_parent_object_id_substitutes_and_escapes() {
        let spec = lookup("key-user-actions-mobile").unwrap();
        let derived = spec.apply_parent_object_id("MOBILE_APPLICATION-1234ABCD5678EF90");
        assert_eq!(
            derived.url_path,
            "/api/config/v1/applications/mobile/MOBILE_APPLICATION-1234ABCD5678EF90/keyUserActions"
        );
        assert!(!derived.has_scope_placeholder());

        let escaped = spec.apply_parent_object_id("needs escape");
        assert!(escaped.url_path.contains("needs%20escape"));
    }

    #[test]
    fn dashboard_tweak_strips_metadata() {
        let tweak = lookup("dashboard").unwrap().tweak_response.unwrap();
        let cleaned = tweak(json!({"metadata": {"clusterVersion": "1.0"}, "dashboardMetadata": {"name": "d"}}));
        assert_eq!(cleaned, json!({"dashboardMetadata": {"name": "d"}}));
    }

    #[test]
    fn dashboards_compare_by_name_and_owner() {
        let a = json!({"dashboardMetadata": {"name": "d", "owner": "me"}, "tiles": [1]});
        let b = json!({"dashboardMetadata": {"name": "d", "owner": "me"}, "tiles": [2]});
        let c = json!({"dashboardMetadata": {"name": "d", "owner": "you"}});
        let equal = lookup("dashboard").unwrap().check_equal.unwrap();
        assert!(equal(&a, &b));
        assert!(!equal(&a, &c));
    }
}
