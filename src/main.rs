mod analytics;
mod config;
mod dashboard;
mod error;
mod export;
mod listings;
mod models;
mod mpesa;
mod saved;
mod session;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use dashboard::Dashboard;
use export::ExportKind;
use listings::{ListingForm, Listings, SearchFilters, DEFAULT_MAX_RENT};
use models::{NewTransaction, TransactionStatus};
use saved::SavedItems;
use session::{AuthUser, Session, SignInMethod};
use store::{FirebaseStore, MemoryStore, RecordStore};

#[derive(Parser)]
#[command(name = "houselook", version, about = "HouseLook rental listings and admin analytics")]
struct Cli {
    /// Run against an in-memory store seeded from this JSON file
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    /// Where the signed-in session is cached
    #[arg(long, global = true, default_value = ".houselook/session.json")]
    session: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the admin dashboard
    Dashboard {
        /// Keep refreshing until Ctrl+C
        #[arg(long)]
        watch: bool,
        /// Print the full snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Saved listings of a user
    Saved {
        #[command(subcommand)]
        action: SavedAction,
    },
    /// Write a CSV report
    Export {
        #[arg(value_enum)]
        kind: ExportKind,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Browse and publish listings
    Listing {
        #[command(subcommand)]
        action: ListingAction,
    },
    /// List property requests, optionally marking one contacted
    Requests {
        #[arg(long)]
        contacted: Option<String>,
    },
    /// Show or set a user's points
    Points {
        user: String,
        #[arg(long)]
        set: Option<i64>,
    },
    /// Create the account mirror for a new user and sign in
    Register {
        uid: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
        /// The identity provider has verified the email address
        #[arg(long)]
        verified: bool,
    },
    /// Sign in as an identity-provider user
    Login {
        uid: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        verified: bool,
        /// Federated sign-in instead of email and password
        #[arg(long)]
        google: bool,
        /// Where to continue once signed in
        #[arg(long)]
        redirect: Option<String>,
    },
    Logout,
    /// Delete the signed-in account and its saved listings
    DeleteAccount,
    /// Re-read the cached session's user from the store
    Whoami,
    /// Record a payment
    Transaction {
        user: String,
        amount: f64,
        #[arg(long, default_value = "premium")]
        kind: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, value_enum, default_value_t = TransactionStatus::Completed)]
        status: TransactionStatus,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        reference: Option<String>,
    },
    /// Mark a user as active now
    Activity { user: String },
    /// Run the mock M-Pesa server
    Mpesa {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum SavedAction {
    List { user: String },
    Add { user: String, item: String },
    Remove { user: String, item: String },
    /// Save when not saved, otherwise unsave
    Toggle { user: String, item: String },
}

#[derive(Subcommand)]
enum ListingAction {
    Show {
        id: String,
    },
    Search {
        #[arg(long)]
        location: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        min_rent: f64,
        #[arg(long, default_value_t = DEFAULT_MAX_RENT)]
        max_rent: f64,
        #[arg(long)]
        room_type: Option<String>,
    },
    /// Publish a listing from a JSON form; requires an admin session
    Create {
        form: PathBuf,
    },
    Owned {
        user: String,
        /// Print only how many listings the user owns
        #[arg(long)]
        count: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    let store = open_store(&config, cli.seed.as_deref()).await?;
    run(cli, &config, store).await
}

async fn run(cli: Cli, config: &Config, store: Arc<dyn RecordStore>) -> anyhow::Result<()> {
    match cli.command {
        Command::Dashboard { watch, json } => {
            let dashboard = Dashboard::new(store);
            if watch {
                dashboard.watch(config.refresh_interval).await?;
            } else {
                let snapshot = dashboard.load_all().await;
                if json {
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                } else {
                    dashboard::log_summary(&snapshot);
                }
            }
        }
        Command::Saved { action } => {
            let saved = SavedItems::new(store, config.saved_ttl);
            match action {
                SavedAction::List { user } => {
                    for item in saved.list_valid_or_empty(&user).await {
                        println!("{item}");
                    }
                }
                SavedAction::Add { user, item } => saved.save(&user, &item).await?,
                SavedAction::Remove { user, item } => saved.unsave(&user, &item).await?,
                SavedAction::Toggle { user, item } => {
                    let now_saved = saved.toggle(&user, &item).await?;
                    println!("{}", if now_saved { "saved" } else { "unsaved" });
                }
            }
        }
        Command::Export { kind, out } => {
            let path = export::write_report(store.as_ref(), kind, out).await?;
            println!("{}", path.display());
        }
        Command::Listing { action } => {
            let listings = Listings::new(store.clone());
            match action {
                ListingAction::Show { id } => match listings.property_detail(&id).await? {
                    Some(detail) => println!("{}", serde_json::to_string_pretty(&detail)?),
                    None => anyhow::bail!("No listing with id {id}"),
                },
                ListingAction::Search {
                    location,
                    min_rent,
                    max_rent,
                    room_type,
                } => {
                    let filters = SearchFilters {
                        location,
                        min_rent,
                        max_rent,
                        room_type,
                    };
                    let found = listings.search(&filters).await?;
                    info!("Found {} listings", found.len());
                    for (i, property) in found.iter().enumerate() {
                        println!(
                            "{}. {} ({} KES)",
                            i + 1,
                            property.name.as_deref().unwrap_or("Untitled Property"),
                            property.rent
                        );
                        println!("   {}", property.location_label());
                        println!("   ID: {}", property.id);
                    }
                }
                ListingAction::Create { form } => {
                    let session = Session::open(store, &cli.session).await?;
                    let json = tokio::fs::read_to_string(&form)
                        .await
                        .with_context(|| format!("Failed to read {}", form.display()))?;
                    let form: ListingForm = serde_json::from_str(&json)?;
                    let id = listings.create_listing(session.user(), &form).await?;
                    println!("{id}");
                }
                ListingAction::Owned { user, count } => {
                    if count {
                        println!("{}", listings.user_property_count(&user).await?);
                    } else {
                        for property in listings.user_properties(&user).await? {
                            println!("{} {}", property.id, property.name.as_deref().unwrap_or(""));
                        }
                    }
                }
            }
        }
        Command::Requests { contacted } => {
            let listings = Listings::new(store);
            if let Some(id) = contacted {
                if !listings.mark_request_contacted(&id).await? {
                    anyhow::bail!("No property request with id {id}");
                }
            }
            for request in listings.property_requests().await? {
                println!(
                    "{} {} {} [{}]",
                    request.id,
                    request.name.as_deref().unwrap_or("-"),
                    request.phone.as_deref().unwrap_or("-"),
                    if request.contacted { "Contacted" } else { "Pending" }
                );
            }
        }
        Command::Points { user, set } => {
            let listings = Listings::new(store);
            if let Some(points) = set {
                listings.set_user_points(&user, points).await?;
            }
            println!("{}", listings.user_points(&user).await?);
        }
        Command::Register {
            uid,
            name,
            email,
            verified,
        } => {
            let mut session = Session::open(store, &cli.session).await?;
            let auth_user = AuthUser {
                uid,
                email,
                display_name: Some(name.clone()),
                email_verified: verified,
            };
            let profile = session.register(&auth_user, &name).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Login {
            uid,
            email,
            name,
            verified,
            google,
            redirect,
        } => {
            let mut session = Session::open(store, &cli.session).await?;
            if let Some(target) = redirect {
                session.set_redirect(target);
            }
            let auth_user = AuthUser {
                uid,
                email,
                display_name: name,
                email_verified: verified,
            };
            let method = if google {
                SignInMethod::Google
            } else {
                SignInMethod::Email
            };
            let profile = session.sign_in(&auth_user, method).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
            if let Some(target) = session.take_redirect().await {
                println!("Continue to {target}");
            }
        }
        Command::Logout => {
            Session::open(store, &cli.session).await?.sign_out().await?;
            info!("Signed out");
        }
        Command::DeleteAccount => {
            let mut session = Session::open(store, &cli.session).await?;
            let uid = session.delete_account().await?;
            println!("Deleted {uid}");
        }
        Command::Whoami => {
            let mut session = Session::open(store, &cli.session).await?;
            let profile = session.refresh().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
            if session.context().is_admin() {
                info!("{} has admin rights", profile.uid);
            }
        }
        Command::Transaction {
            user,
            amount,
            kind,
            description,
            status,
            method,
            reference,
        } => {
            let transaction = NewTransaction {
                user_id: user,
                amount,
                kind,
                description,
                status,
                payment_method: method,
                reference,
            };
            let id = Listings::new(store).save_transaction(&transaction).await?;
            println!("{id}");
        }
        Command::Activity { user } => Listings::new(store).update_user_activity(&user).await?,
        Command::Mpesa { port } => mpesa::serve(port.unwrap_or(config.mpesa_port)).await?,
    }

    Ok(())
}

async fn open_store(
    config: &Config,
    seed: Option<&std::path::Path>,
) -> anyhow::Result<Arc<dyn RecordStore>> {
    match seed {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read seed file {}", path.display()))?;
            let data = serde_json::from_str(&json)?;
            info!("Using in-memory store seeded from {}", path.display());
            Ok(Arc::new(MemoryStore::with_data(data)))
        }
        None => {
            info!("Using realtime database at {}", config.database_url);
            Ok(Arc::new(FirebaseStore::new(config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("houselook").chain(args.iter().copied()))
    }

    #[tokio::test]
    async fn saved_list_survives_store_outage() {
        let store = Arc::new(MemoryStore::new());
        store.set_online(false);

        run(cli(&["saved", "list", "u1"]), &Config::default(), store)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn saved_toggle_flips_relation() {
        let store = Arc::new(MemoryStore::new());
        let config = Config::default();

        run(cli(&["saved", "toggle", "u1", "p1"]), &config, store.clone())
            .await
            .unwrap();
        assert_eq!(store.get("users/u1/saved/p1").await.unwrap(), Some(json!(true)));

        run(cli(&["saved", "toggle", "u1", "p1"]), &config, store.clone())
            .await
            .unwrap();
        assert_eq!(store.get("users/u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn session_commands_share_the_cached_session() {
        let dir = std::env::temp_dir().join(format!("houselook-cli-{}", std::process::id()));
        let session = dir.join("session.json");
        let session = session.to_str().unwrap();
        let store = Arc::new(MemoryStore::new());
        let config = Config::default();

        assert!(run(cli(&["--session", session, "whoami"]), &config, store.clone())
            .await
            .is_err());

        run(
            cli(&["--session", session, "register", "u1", "--name", "Ann", "--verified"]),
            &config,
            store.clone(),
        )
        .await
        .unwrap();
        assert_eq!(store.get("users/u1/points").await.unwrap(), Some(json!(100)));
        run(cli(&["--session", session, "whoami"]), &config, store.clone())
            .await
            .unwrap();

        run(cli(&["--session", session, "logout"]), &config, store.clone())
            .await
            .unwrap();
        assert!(run(cli(&["--session", session, "whoami"]), &config, store.clone())
            .await
            .is_err());

        // Unverified email sign-in is refused; federated sign-in is not
        assert!(run(cli(&["--session", session, "login", "u2"]), &config, store.clone())
            .await
            .is_err());
        run(
            cli(&["--session", session, "login", "u2", "--google"]),
            &config,
            store.clone(),
        )
        .await
        .unwrap();
        assert_eq!(store.get("users/u2/name").await.unwrap(), Some(json!("Google User")));

        run(cli(&["--session", session, "delete-account"]), &config, store.clone())
            .await
            .unwrap();
        assert_eq!(store.get("users/u2").await.unwrap(), None);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn transaction_and_activity_are_recorded() {
        let store = Arc::new(MemoryStore::new());
        let config = Config::default();

        run(
            cli(&["transaction", "u1", "250", "--kind", "listing_fee", "--status", "pending"]),
            &config,
            store.clone(),
        )
        .await
        .unwrap();
        let transactions = store.get("transactions").await.unwrap().unwrap();
        let (_, record) = transactions.as_object().unwrap().iter().next().unwrap();
        assert_eq!(record["userId"], json!("u1"));
        assert_eq!(record["amount"], json!(250.0));
        assert_eq!(record["type"], json!("listing_fee"));
        assert_eq!(record["status"], json!("pending"));

        run(cli(&["activity", "u1"]), &config, store.clone()).await.unwrap();
        assert!(store.get("users/u1/lastActive").await.unwrap().is_some());
    }
}
