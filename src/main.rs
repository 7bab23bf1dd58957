use std::sync::Arc;

use clap::Parser;
use gatewarden::cli::{Args, init_logging, validate_backend_url};
use gatewarden::clock::SystemClock;
use gatewarden::guard::{AccessGuard, Navigation};
use gatewarden::permissions::{PermissionResolver, RouteTable};
use gatewarden::refresh::RefreshCoordinator;
use gatewarden::session::{SessionCache, SessionStore};
use gatewarden::transport::HttpAuthBackend;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(backend_url) = validate_backend_url(&args.backend_url) else {
        std::process::exit(1);
    };
    let backend = match HttpAuthBackend::new(&backend_url) {
        Ok(backend) => backend,
        Err(e) => {
            error!(error = %e, "Failed to build backend endpoints");
            std::process::exit(1);
        }
    };

    let store = Arc::new(SessionStore::new());
    let mut coordinator = RefreshCoordinator::new(Arc::clone(&store), backend);
    if let Some(dir) = &args.cache_dir {
        coordinator = coordinator.with_cache(SessionCache::new(dir));
    }
    let coordinator = Arc::new(coordinator);

    if coordinator.restore_from_cache() {
        info!("Session restored from cache");
    } else {
        match coordinator.login(&args.email, &args.password).await {
            Ok(principal) => {
                info!(email = %principal.email, role = %principal.role, "Session established")
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                std::process::exit(1);
            }
        }
    }

    let guard = AccessGuard::new(
        Arc::clone(&store),
        PermissionResolver::new(RouteTable::default()),
        Arc::clone(&coordinator),
        Arc::new(SystemClock),
    );

    let menu = guard.accessible_routes();
    info!(routes = ?menu, "Accessible routes");

    for route in &args.routes {
        match guard.navigate(route).await {
            Navigation::Render { route } => info!(route = %route, "allow"),
            Navigation::Pending { route } => info!(route = %route, "pending refresh"),
            Navigation::RedirectToLogin {
                attempted_route,
                reason,
            } => warn!(route = %attempted_route, reason = ?reason, "redirect to login"),
            Navigation::RedirectToDashboard { reason } => {
                warn!(route = %route, reason = %reason, "redirect to dashboard")
            }
        }
    }

    if args.logout {
        coordinator.logout().await;
        info!("Logged out");
    }
}
