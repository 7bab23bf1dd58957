//! Static route-to-resource mapping.
//!
//! Reclassifying a route is a configuration change here, never a change to
//! the resolver's rules.

/// Resource classification for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteResource {
    /// Reachable by any authenticated principal (dashboard and friends).
    Public,
    /// An ordinary data table; access requires a matching grant.
    Table(&'static str),
    /// Data import screens. Admins, or holders of a foundational-table
    /// grant, may enter.
    DataImport,
    /// Audit log screens. Superadmin only.
    Logs,
    /// User management screens. Superadmin only.
    UserManagement,
    /// Table administration screens. Superadmin only.
    TableAdmin,
}

/// Tables whose possession implicitly grants access to data import.
pub const FOUNDATIONAL_TABLES: &[&str] = &["intezmeny", "tanulo_letszam", "alkalmazott_letszam"];

/// The exhaustive route table consumed by the resolver.
///
/// Routes absent from the table are unmapped and denied for everyone but
/// superadmins.
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<(String, RouteResource)>,
}

impl RouteTable {
    pub fn new(entries: Vec<(String, RouteResource)>) -> Self {
        Self { entries }
    }

    /// Resource classification for a route, if the route is mapped.
    pub fn resource(&self, route: &str) -> Option<RouteResource> {
        let route = normalize(route);
        self.entries
            .iter()
            .find(|(path, _)| path == route)
            .map(|(_, resource)| *resource)
    }

    /// All mapped routes, in table order.
    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(path, _)| path.as_str())
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        let entry = |path: &str, resource| (path.to_string(), resource);
        Self::new(vec![
            entry("/", RouteResource::Public),
            entry("/dashboard", RouteResource::Public),
            entry("/tanulo_letszam", RouteResource::Table("tanulo_letszam")),
            entry(
                "/alkalmazott_letszam",
                RouteResource::Table("alkalmazott_letszam"),
            ),
            entry("/intezmeny", RouteResource::Table("intezmeny")),
            entry("/szakkepzes", RouteResource::Table("szakkepzes")),
            entry("/tanugy", RouteResource::Table("tanugy")),
            entry("/adat-import", RouteResource::DataImport),
            entry("/logs", RouteResource::Logs),
            entry("/felhasznalok", RouteResource::UserManagement),
            entry("/tablak", RouteResource::TableAdmin),
        ])
    }
}

/// Strip a trailing slash so `/logs/` and `/logs` classify identically.
fn normalize(route: &str) -> &str {
    if route.len() > 1 {
        route.trim_end_matches('/')
    } else {
        route
    }
}
