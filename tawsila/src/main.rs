use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tawsila_core::{
    bootstrap::{init_services, load_config, Services},
    logging,
    models::{Locale, Permission, PermissionModule, UserSession, PERMISSION_MODULES},
    routing::RecordingNavigator,
    service::{
        default_navigation, MatchMode, NavigationFilter, PageGuard, PageRequirement,
        PermissionsState, RefreshTrigger,
    },
};

#[derive(Parser, Debug)]
#[command(name = "tawsila")]
#[command(about = "Tawsila dashboard permission tool", long_about = None)]
struct Args {
    /// Config file (YAML or TOML)
    #[arg(long, env = "TAWSILA_CONFIG_PATH", global = true)]
    config: Option<String>,

    /// UI locale for redirects and labels (defaults to locale.default_locale)
    #[arg(long, global = true)]
    locale: Option<Locale>,

    /// Use only the cached snapshot, never call the profile endpoint
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a session from a bearer token
    Login {
        #[arg(long, env = "TAWSILA_TOKEN")]
        token: String,
    },
    /// End the session and remove the stored copy
    Logout,
    /// Print the effective permissions of the session
    Permissions {
        #[arg(long)]
        json: bool,
    },
    /// Evaluate a page requirement like a page guard would
    Check {
        /// Required permissions, e.g. list-users
        #[arg(required = false)]
        permissions: Vec<Permission>,
        #[arg(long, default_value = "any")]
        mode: MatchMode,
    },
    /// Print the sidebar as the session would see it
    Nav {
        #[arg(long)]
        json: bool,
    },
    /// Run the request-time route gate for a path
    Route { path: String },
    /// Print the permission directory
    Directory,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // 1. Load configuration
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Tawsila permission tool starting...");

    // 3. Restore session and wire services
    let services = init_services(&config)?;
    let locale = args.locale.unwrap_or(config.locale.default_locale);

    match args.command {
        Command::Login { token } => {
            services.session.login(UserSession {
                token: Some(token),
                ..UserSession::default()
            })?;
            let state = services.permissions.refresh(RefreshTrigger::Force).await;
            report_error(&state);
            println!("Signed in with {} permission(s)", state.permissions.len());
        }
        Command::Logout => {
            services.session.logout()?;
            println!("Signed out");
        }
        Command::Permissions { json } => {
            let state = evaluate(&services, args.offline).await;
            report_error(&state);
            if json {
                println!("{}", serde_json::to_string_pretty(&state.permissions)?);
            } else {
                if let Some(user) = services.session.current() {
                    println!("{} [{}]", user.display_name(locale), user.roles.join(", "));
                }
                print_permissions(&state);
            }
        }
        Command::Check { permissions, mode } => {
            let state = evaluate(&services, args.offline).await;
            report_error(&state);

            let navigator = RecordingNavigator::new();
            let mut guard = PageGuard::new(PageRequirement::new(permissions, mode), locale);
            let decision = guard.evaluate(&state, &navigator);

            match decision {
                None => println!("pending"),
                Some(true) => println!("granted"),
                Some(false) => println!("denied"),
            }
            if let Some(location) = navigator.last() {
                println!("redirect {location}");
            }
            if decision != Some(true) {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Nav { json } => {
            let state = evaluate(&services, args.offline).await;
            report_error(&state);

            let visible = NavigationFilter::new().filter(&default_navigation(), &state);
            if json {
                println!("{}", serde_json::to_string_pretty(&visible)?);
            } else {
                for group in &visible {
                    println!("{}", group.title.get(locale));
                    for item in &group.items {
                        println!("  {:<28} {}", item.label.get(locale), item.localized_href(locale));
                    }
                }
            }
        }
        Command::Route { path } => {
            let token = services.store.load_token()?;
            let decision = services.route_gate.decide(&path, token.as_deref());
            match decision.location() {
                Some(location) => println!("redirect {location}"),
                None => println!("allow"),
            }
        }
        Command::Directory => {
            for (module, permissions) in PERMISSION_MODULES {
                let names: Vec<&str> = permissions.iter().map(|p| p.as_str()).collect();
                println!("{:<14} {}", module.as_str(), names.join(", "));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Effective permissions, fetching the live profile unless offline
async fn evaluate(services: &Services, offline: bool) -> PermissionsState {
    if offline {
        services.permissions.snapshot()
    } else {
        services.permissions.refresh(RefreshTrigger::Mount).await
    }
}

fn report_error(state: &PermissionsState) {
    if let Some(error) = &state.error {
        warn!(error = %error, "Profile fetch failed, showing cached permissions");
    }
}

fn print_permissions(state: &PermissionsState) {
    if state.is_loading {
        println!("(no permissions yet)");
        return;
    }

    let visible = state.permissions.visible_modules();
    for module in PermissionModule::ALL {
        if !visible.contains(module) {
            continue;
        }
        let granted: Vec<&str> = state
            .permissions
            .known()
            .filter(|p| p.module() == *module)
            .map(Permission::as_str)
            .collect();
        println!("{:<14} {}", module.as_str(), granted.join(", "));
    }

    let unknown: Vec<&str> = state.permissions.unknown().collect();
    if !unknown.is_empty() {
        println!("{:<14} {}", "(unknown)", unknown.join(", "));
    }
}
