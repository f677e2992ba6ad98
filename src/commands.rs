//! Handlers for each `gator` subcommand.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::Command;
use crate::config::{parse_interval, Config};
use crate::db::{Database, User};
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::runner::Runner;
use crate::scheduler::Scheduler;

pub struct State {
    pub config: Config,
    pub config_path: PathBuf,
    pub db: Arc<Database>,
}

/// Dispatch a parsed command. Commands that act for a user resolve the
/// logged-in user first and fail if there is none.
pub async fn run(state: &mut State, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Register { name } => register(state, &name).await,
        Command::Login { name } => login(state, &name).await,
        Command::Reset => reset(state).await,
        Command::Users => users(state).await,
        Command::Agg { interval } => {
            current_user(state).await?;
            aggregate(state, &interval).await
        }
        Command::Addfeed { name, url } => {
            let user = current_user(state).await?;
            add_feed(state, &user, &name, &url).await
        }
        Command::Feeds => feeds(state).await,
        Command::Follow { url } => {
            let user = current_user(state).await?;
            follow(state, &user, &url).await
        }
        Command::Following => {
            let user = current_user(state).await?;
            following(state, &user).await
        }
        Command::Unfollow { url } => {
            let user = current_user(state).await?;
            unfollow(state, &user, &url).await
        }
        Command::Browse { limit } => {
            let user = current_user(state).await?;
            browse(state, &user, limit).await
        }
    }
}

pub async fn current_user(state: &State) -> Result<User> {
    let name = state
        .config
        .current_user_name
        .as_deref()
        .ok_or(Error::NotLoggedIn)?;

    state
        .db
        .get_user_by_name(name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("user {:?}", name)))
}

async fn register(state: &mut State, name: &str) -> anyhow::Result<()> {
    if state.db.get_user_by_name(name).await?.is_some() {
        anyhow::bail!("user {:?} already exists", name);
    }

    let user = state.db.create_user(name).await?;
    state
        .config
        .set_user(&state.config_path, &user.name)
        .context("failed to save config")?;

    println!("Registered user {} ({})", user.name, user.id);
    Ok(())
}

async fn login(state: &mut State, name: &str) -> anyhow::Result<()> {
    let user = state
        .db
        .get_user_by_name(name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("user {:?}", name)))?;

    state
        .config
        .set_user(&state.config_path, &user.name)
        .context("failed to save config")?;

    println!("Logged in as {}", user.name);
    Ok(())
}

async fn reset(state: &State) -> anyhow::Result<()> {
    state.db.reset().await.context("reset failed")?;
    println!("Database reset");
    Ok(())
}

async fn users(state: &State) -> anyhow::Result<()> {
    let current = state.config.current_user_name.as_deref();

    for user in state.db.get_users().await? {
        if Some(user.name.as_str()) == current {
            println!("* {} (current)", user.name);
        } else {
            println!("* {}", user.name);
        }
    }
    Ok(())
}

async fn aggregate(state: &State, interval: &str) -> anyhow::Result<()> {
    let interval = parse_interval(interval)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping after the current feed");
            trigger.cancel();
        }
    });

    aggregate_until(state, interval, cancel).await
}

/// Run the polling loop with the configured timeouts until `cancel` fires.
pub async fn aggregate_until(
    state: &State,
    interval: Duration,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let fetcher = Fetcher::new(state.config.request_timeout())?;
    let runner = Runner::new(Scheduler::new(state.db.clone(), fetcher))
        .with_shutdown_grace(state.config.shutdown_grace());

    runner.run(interval, cancel).await?;
    Ok(())
}

async fn add_feed(state: &State, user: &User, name: &str, url: &str) -> anyhow::Result<()> {
    let feed = state
        .db
        .create_feed(name, url, user.id)
        .await
        .with_context(|| format!("failed to add feed {}", url))?;

    state
        .db
        .create_feed_follow(user.id, feed.id)
        .await
        .context("failed to follow the new feed")?;

    println!("Added feed {} ({})", feed.name, feed.url);
    Ok(())
}

async fn feeds(state: &State) -> anyhow::Result<()> {
    for feed in state.db.get_feeds().await? {
        println!(
            "Name: {}, URL: {}, User: {}",
            feed.name, feed.url, feed.user_name
        );
    }
    Ok(())
}

async fn follow(state: &State, user: &User, url: &str) -> anyhow::Result<()> {
    let feed = state
        .db
        .get_feed_by_url(url)
        .await?
        .ok_or_else(|| Error::NotFound(format!("feed {}", url)))?;

    let follow = state
        .db
        .create_feed_follow(user.id, feed.id)
        .await
        .with_context(|| format!("failed to follow {}", url))?;

    println!("{} now follows {}", follow.user_name, follow.feed_name);
    Ok(())
}

async fn following(state: &State, user: &User) -> anyhow::Result<()> {
    for follow in state.db.get_feed_follows_for_user(user.id).await? {
        println!("{}", follow.feed_name);
    }
    Ok(())
}

async fn unfollow(state: &State, user: &User, url: &str) -> anyhow::Result<()> {
    let feed = state
        .db
        .get_feed_by_url(url)
        .await?
        .ok_or_else(|| Error::NotFound(format!("feed {}", url)))?;

    if !state.db.delete_feed_follow(user.id, feed.id).await? {
        anyhow::bail!("{} does not follow {}", user.name, url);
    }

    println!("{} unfollowed {}", user.name, feed.name);
    Ok(())
}

async fn browse(state: &State, user: &User, limit: i64) -> anyhow::Result<()> {
    for post in state.db.get_posts_for_user(user.id, limit).await? {
        println!(
            "Post \"{}\" ({})",
            post.title.as_deref().unwrap_or("Untitled"),
            post.published_at.format("%Y-%m-%d %H:%M")
        );
        println!("\t{}", post.url);
        if let Some(description) = post.description.as_deref().filter(|d| !d.is_empty()) {
            println!("\t{}", description);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_state() -> (State, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        let state = State {
            config: Config::default(),
            config_path: dir.path().join("gator.toml"),
            db: Arc::new(db),
        };
        (state, dir)
    }

    async fn run_command(state: &mut State, command: Command) -> anyhow::Result<()> {
        run(state, command).await
    }

    #[tokio::test]
    async fn test_register_logs_in_and_saves_config() {
        let (mut state, _dir) = create_state().await;

        run_command(
            &mut state,
            Command::Register {
                name: "alice".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(state.config.current_user_name.as_deref(), Some("alice"));
        let saved = Config::load(&state.config_path).unwrap();
        assert_eq!(saved.current_user_name.as_deref(), Some("alice"));
        assert!(state.db.get_user_by_name("alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let (mut state, _dir) = create_state().await;
        let command = Command::Register {
            name: "alice".to_string(),
        };

        run_command(&mut state, command.clone()).await.unwrap();
        assert!(run_command(&mut state, command).await.is_err());
    }

    #[tokio::test]
    async fn test_login_unknown_user_fails() {
        let (mut state, _dir) = create_state().await;

        let result = run_command(
            &mut state,
            Command::Login {
                name: "ghost".to_string(),
            },
        )
        .await;

        assert!(result.is_err());
        assert!(state.config.current_user_name.is_none());
    }

    #[tokio::test]
    async fn test_login_switches_user() {
        let (mut state, _dir) = create_state().await;
        state.db.create_user("alice").await.unwrap();
        state.db.create_user("bob").await.unwrap();

        run_command(
            &mut state,
            Command::Login {
                name: "bob".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(state.config.current_user_name.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_logged_in_commands_require_user() {
        let (mut state, _dir) = create_state().await;

        let result = run_command(&mut state, Command::Following).await;
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn test_addfeed_creates_and_follows() {
        let (mut state, _dir) = create_state().await;
        run_command(
            &mut state,
            Command::Register {
                name: "alice".to_string(),
            },
        )
        .await
        .unwrap();

        run_command(
            &mut state,
            Command::Addfeed {
                name: "Blog".to_string(),
                url: "https://blog.example.com/rss".to_string(),
            },
        )
        .await
        .unwrap();

        let user = current_user(&state).await.unwrap();
        let follows = state.db.get_feed_follows_for_user(user.id).await.unwrap();
        assert_eq!(follows.len(), 1);
        assert_eq!(follows[0].feed_name, "Blog");
    }

    #[tokio::test]
    async fn test_follow_and_unfollow_existing_feed() {
        let (mut state, _dir) = create_state().await;
        let owner = state.db.create_user("owner").await.unwrap();
        state
            .db
            .create_feed("Blog", "https://blog.example.com/rss", owner.id)
            .await
            .unwrap();
        run_command(
            &mut state,
            Command::Register {
                name: "reader".to_string(),
            },
        )
        .await
        .unwrap();
        let reader = current_user(&state).await.unwrap();

        run_command(
            &mut state,
            Command::Follow {
                url: "https://blog.example.com/rss".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            state
                .db
                .get_feed_follows_for_user(reader.id)
                .await
                .unwrap()
                .len(),
            1
        );

        run_command(
            &mut state,
            Command::Unfollow {
                url: "https://blog.example.com/rss".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(state
            .db
            .get_feed_follows_for_user(reader.id)
            .await
            .unwrap()
            .is_empty());

        // Unfollowing again reports an error instead of silently succeeding.
        let again = run_command(
            &mut state,
            Command::Unfollow {
                url: "https://blog.example.com/rss".to_string(),
            },
        )
        .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_follow_unknown_feed_fails() {
        let (mut state, _dir) = create_state().await;
        run_command(
            &mut state,
            Command::Register {
                name: "alice".to_string(),
            },
        )
        .await
        .unwrap();

        let result = run_command(
            &mut state,
            Command::Follow {
                url: "https://nowhere.example.com/rss".to_string(),
            },
        )
        .await;

        assert!(matches!(
            result.unwrap_err().downcast_ref::<Error>(),
            Some(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_removes_everything() {
        let (mut state, _dir) = create_state().await;
        run_command(
            &mut state,
            Command::Register {
                name: "alice".to_string(),
            },
        )
        .await
        .unwrap();

        run_command(&mut state, Command::Reset).await.unwrap();

        assert!(state.db.get_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_agg_zero_interval_is_config_error() {
        let (mut state, _dir) = create_state().await;
        run_command(
            &mut state,
            Command::Register {
                name: "alice".to_string(),
            },
        )
        .await
        .unwrap();

        let result = run_command(
            &mut state,
            Command::Agg {
                interval: "0s".to_string(),
            },
        )
        .await;

        assert!(matches!(
            result.unwrap_err().downcast_ref::<Error>(),
            Some(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_agg_invalid_interval_is_config_error() {
        let (mut state, _dir) = create_state().await;
        run_command(
            &mut state,
            Command::Register {
                name: "alice".to_string(),
            },
        )
        .await
        .unwrap();

        let result = run_command(
            &mut state,
            Command::Agg {
                interval: "soon".to_string(),
            },
        )
        .await;

        assert!(matches!(
            result.unwrap_err().downcast_ref::<Error>(),
            Some(Error::Config(_))
        ));
    }
}
