use std::sync::Arc;

use thiserror::Error;

use crate::errors::WatchError;
use crate::services::subscriber::SubscriberId;
use crate::services::watch_service::WatchService;

pub const HELP_TEXT: &str = "Welcome. Available commands are:

/start -- Show this message
/register -- register this chat
/start_bots -- start fetching with registered bots
/stop -- stop fetching
/add_bot <name> <link> -- add a bot that scans the specified link
/remove_bot <name> -- stop and remove a bot
/clear_bots -- stop and clear all registered bots
/status -- get status information
/add_filter <pattern>... -- add filters to hide unwanted listings
/show_filters -- show active filters
/clear_filters -- clear all filters";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    Register,
    StartBots,
    Stop,
    AddBot { name: String, link: String },
    RemoveBot { name: String },
    ClearBots,
    Status,
    AddFilter { patterns: Vec<String> },
    ShowFilters,
    ClearFilters,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("commands start with '/'. send /start for a list of commands")]
    NotACommand,

    #[error("unknown command /{0}. send /start for a list of commands")]
    Unknown(String),

    #[error("{0}")]
    Usage(&'static str),
}

impl ChatCommand {
    /// Parse a `/command arg...` line. Arguments are split on whitespace.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace();
        let head = words.next().ok_or(CommandError::NotACommand)?;
        let name = head.strip_prefix('/').ok_or(CommandError::NotACommand)?;
        let args: Vec<String> = words.map(str::to_string).collect();

        let command = match name {
            "start" | "help" => ChatCommand::Help,
            "register" => ChatCommand::Register,
            "start_bots" => ChatCommand::StartBots,
            "stop" => ChatCommand::Stop,
            "add_bot" => match <[String; 2]>::try_from(args) {
                Ok([name, link]) => ChatCommand::AddBot { name, link },
                Err(_) => {
                    return Err(CommandError::Usage(
                        "add_bot command requires two arguments. usage:\n/add_bot <name> <link>",
                    ))
                }
            },
            "remove_bot" => match <[String; 1]>::try_from(args) {
                Ok([name]) => ChatCommand::RemoveBot { name },
                Err(_) => {
                    return Err(CommandError::Usage(
                        "wrong number of arguments. usage:\n/remove_bot <name>",
                    ))
                }
            },
            "clear_bots" => ChatCommand::ClearBots,
            "status" => ChatCommand::Status,
            "add_filter" => {
                if args.is_empty() {
                    return Err(CommandError::Usage(
                        "add_filter command requires at least one pattern. usage:\n/add_filter <pattern>...",
                    ));
                }
                ChatCommand::AddFilter { patterns: args }
            }
            "show_filters" => ChatCommand::ShowFilters,
            "clear_filters" => ChatCommand::ClearFilters,
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        Ok(command)
    }
}

/// Split an optional `@<id>` address off a line. Lines without one, or
/// with an unparsable id, go to `default`.
pub fn split_target(line: &str, default: SubscriberId) -> (SubscriberId, &str) {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix('@') {
        let (target, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if let Ok(id) = target.parse::<SubscriberId>() {
            return (id, text.trim_start());
        }
    }
    (default, line)
}

/// Turns chat commands into `WatchService` calls and reply text.
pub struct CommandService {
    watch: Arc<WatchService>,
}

impl CommandService {
    pub fn new(watch: Arc<WatchService>) -> Self {
        Self { watch }
    }

    pub fn watch(&self) -> &Arc<WatchService> {
        &self.watch
    }

    /// Parse and run one input line, returning the reply
    pub async fn handle_line(&self, id: SubscriberId, line: &str) -> String {
        match ChatCommand::parse(line) {
            Ok(command) => self.execute(id, command).await,
            Err(e) => e.to_string(),
        }
    }

    pub async fn execute(&self, id: SubscriberId, command: ChatCommand) -> String {
        // any command registers the chat on first contact
        let newly_registered = !self.watch.is_registered(id);
        self.watch.register(id);

        let reply = match command {
            ChatCommand::Help => Ok(HELP_TEXT.to_string()),
            ChatCommand::Register if newly_registered => {
                Ok("successfully registered this chat".to_string())
            }
            ChatCommand::Register => Ok("This chat is already registered.".to_string()),
            ChatCommand::StartBots => self.start_bots(id).await,
            ChatCommand::Stop => self.stop(id).await,
            ChatCommand::AddBot { name, link } => self.add_bot(id, &name, &link).await,
            ChatCommand::RemoveBot { name } => self.remove_bot(id, &name).await,
            ChatCommand::ClearBots => self.clear_bots(id).await,
            ChatCommand::Status => self.status(id).await,
            ChatCommand::AddFilter { patterns } => self.add_filters(id, &patterns).await,
            ChatCommand::ShowFilters => self.show_filters(id).await,
            ChatCommand::ClearFilters => self
                .watch
                .clear_filters(id)
                .await
                .map(|()| "cleared all filters".to_string()),
        };

        reply.unwrap_or_else(|e| {
            tracing::warn!(subscriber = id, "Command failed: {}", e);
            format!("something went wrong: {}", e)
        })
    }

    async fn start_bots(&self, id: SubscriberId) -> Result<String, WatchError> {
        match self.watch.start(id).await {
            Ok(()) => Ok("Fetch job started".to_string()),
            Err(WatchError::AlreadyRunning(_)) => Ok("Fetch job is already running".to_string()),
            Err(e) => Err(e),
        }
    }

    async fn stop(&self, id: SubscriberId) -> Result<String, WatchError> {
        match self.watch.stop(id).await {
            Ok(()) => Ok("Fetch job stopped".to_string()),
            Err(WatchError::NotRunning(_)) => {
                Ok("Fetch job is not running yet. Start Fetch job with /start_bots".to_string())
            }
            Err(e) => Err(e),
        }
    }

    async fn add_bot(&self, id: SubscriberId, name: &str, link: &str) -> Result<String, WatchError> {
        match self.watch.add_tracker(id, name, link).await {
            Ok(count) => Ok(format!(
                "added new bot: {}, with {} items registered.",
                name, count
            )),
            Err(WatchError::InvalidSource(_)) => {
                Ok("something went wrong, link is not valid!".to_string())
            }
            Err(WatchError::DuplicateName(_)) => Ok(format!(
                "a bot named {} already exists. remove it first with /remove_bot {}",
                name, name
            )),
            Err(WatchError::FetchFailure { reason, .. }) => {
                Ok(format!("could not fetch {}: {}", link, reason))
            }
            Err(e) => Err(e),
        }
    }

    async fn remove_bot(&self, id: SubscriberId, name: &str) -> Result<String, WatchError> {
        let removal = match self.watch.remove_tracker(id, name).await {
            Ok(removal) => removal,
            Err(WatchError::NotFound(_)) => {
                return Ok(
                    "could not remove bot from active list. are you sure it exists?".to_string(),
                )
            }
            Err(e) => return Err(e),
        };

        let mut message = format!("successfully removed {}.", name);
        if removal.remaining == 0 {
            message.push_str("\nStopping fetch job, because there are no more active bots.");
        }
        Ok(message)
    }

    async fn clear_bots(&self, id: SubscriberId) -> Result<String, WatchError> {
        let removed = self.watch.clear_all(id).await?;

        let mut info = String::from("Cleared registered bots. removed bots:");
        for tracker in removed {
            info.push_str(&format!("\n- {} -- {}", tracker.name, tracker.source_url));
        }
        Ok(info)
    }

    async fn status(&self, id: SubscriberId) -> Result<String, WatchError> {
        let status = self.watch.status(id).await?;

        let mut info = format!("status: {}", status.state);
        info.push_str("\nregistered links:");
        for tracker in &status.trackers {
            info.push_str(&format!(
                "\n{}: {} items registered",
                tracker.name, tracker.item_count
            ));
        }
        Ok(info)
    }

    async fn add_filters(&self, id: SubscriberId, patterns: &[String]) -> Result<String, WatchError> {
        match self.watch.add_filters(id, patterns).await {
            Ok(all) => Ok(format!("added new filter(s): {}", bullet_list(&all))),
            Err(WatchError::InvalidPattern(e)) => Ok(format!("invalid filter pattern: {}", e)),
            Err(e) => Err(e),
        }
    }

    async fn show_filters(&self, id: SubscriberId) -> Result<String, WatchError> {
        let filters = self.watch.filters(id).await?;
        if filters.is_empty() {
            return Ok("no active filters".to_string());
        }
        Ok(format!("current filter(s): {}", bullet_list(&filters)))
    }
}

fn bullet_list(entries: &[String]) -> String {
    entries.iter().map(|e| format!("\n- {}", e)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawListing;
    use crate::services::scheduler::JobState;
    use crate::services::watch_service::{CycleCallbacks, WatchSettings};
    use crate::sources::MockListingSource;
    use std::time::Duration;

    fn service() -> CommandService {
        let mut source = MockListingSource::new();
        source.expect_fetch().returning(|url| {
            if url.contains("empty") {
                return Ok(Vec::new());
            }
            Ok(vec![
                RawListing::new(1, "Bike").with_self_link("https://x/1"),
                RawListing::new(2, "Lamp").with_self_link("https://x/2"),
            ])
        });

        let (callbacks, _rx) = CycleCallbacks::channel();
        let settings = WatchSettings {
            poll_interval: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(5),
        };
        CommandService::new(Arc::new(WatchService::new(
            Arc::new(source),
            settings,
            callbacks,
        )))
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ChatCommand::parse("/start"), Ok(ChatCommand::Help));
        assert_eq!(
            ChatCommand::parse("/add_bot bikes https://x/s?q=1"),
            Ok(ChatCommand::AddBot {
                name: "bikes".to_string(),
                link: "https://x/s?q=1".to_string()
            })
        );
        assert_eq!(
            ChatCommand::parse("  /add_filter a  b "),
            Ok(ChatCommand::AddFilter {
                patterns: vec!["a".to_string(), "b".to_string()]
            })
        );
    }

    #[test]
    fn test_parse_argument_counts() {
        assert!(matches!(
            ChatCommand::parse("/add_bot bikes"),
            Err(CommandError::Usage(msg)) if msg.contains("/add_bot <name> <link>")
        ));
        assert!(matches!(
            ChatCommand::parse("/remove_bot"),
            Err(CommandError::Usage(_))
        ));
        assert!(matches!(
            ChatCommand::parse("/add_filter"),
            Err(CommandError::Usage(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_commands() {
        assert_eq!(ChatCommand::parse("hello"), Err(CommandError::NotACommand));
        assert_eq!(ChatCommand::parse(""), Err(CommandError::NotACommand));
        assert_eq!(
            ChatCommand::parse("/dance"),
            Err(CommandError::Unknown("dance".to_string()))
        );
    }

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("/status", 7), (7, "/status"));
        assert_eq!(split_target("@12 /status", 7), (12, "/status"));
        assert_eq!(split_target("  @-3   /stop ", 7), (-3, "/stop"));
        assert_eq!(split_target("@me /stop", 7), (7, "@me /stop"));
    }

    #[tokio::test]
    async fn test_register_twice() {
        let commands = service();

        assert_eq!(
            commands.handle_line(1, "/register").await,
            "successfully registered this chat"
        );
        assert_eq!(
            commands.handle_line(1, "/register").await,
            "This chat is already registered."
        );
    }

    #[tokio::test]
    async fn test_add_bot_replies() {
        let commands = service();

        assert_eq!(
            commands.handle_line(1, "/add_bot bikes https://x/bikes").await,
            "added new bot: bikes, with 2 items registered."
        );
        assert_eq!(
            commands.handle_line(1, "/add_bot lamps not-a-link").await,
            "something went wrong, link is not valid!"
        );
        assert_eq!(
            commands.handle_line(1, "/add_bot nothing https://x/empty").await,
            "something went wrong, link is not valid!"
        );
        assert!(commands
            .handle_line(1, "/add_bot bikes https://x/other")
            .await
            .contains("already exists"));
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        let commands = service();

        assert_eq!(
            commands.handle_line(1, "/stop").await,
            "Fetch job is not running yet. Start Fetch job with /start_bots"
        );
    }

    #[tokio::test]
    async fn test_remove_last_bot_stops_job() {
        let commands = service();
        commands.handle_line(1, "/add_bot bikes https://x/bikes").await;
        assert_eq!(commands.handle_line(1, "/start_bots").await, "Fetch job started");

        let reply = commands.handle_line(1, "/remove_bot bikes").await;

        assert_eq!(
            reply,
            "successfully removed bikes.\nStopping fetch job, because there are no more active bots."
        );
        assert_eq!(commands.watch().job_state(1).await, JobState::Idle);
        assert_eq!(
            commands.handle_line(1, "/remove_bot bikes").await,
            "could not remove bot from active list. are you sure it exists?"
        );
    }

    #[tokio::test]
    async fn test_clear_bots_lists_removed() {
        let commands = service();
        commands.handle_line(1, "/add_bot bikes https://x/bikes").await;
        commands.handle_line(1, "/add_bot lamps https://x/lamps").await;

        let reply = commands.handle_line(1, "/clear_bots").await;

        assert_eq!(
            reply,
            "Cleared registered bots. removed bots:\n- bikes -- https://x/bikes\n- lamps -- https://x/lamps"
        );
    }

    #[tokio::test]
    async fn test_status_text() {
        let commands = service();
        commands.handle_line(1, "/add_bot bikes https://x/bikes").await;

        assert_eq!(
            commands.handle_line(1, "/status").await,
            "status: idle\nregistered links:\nbikes: 2 items registered"
        );

        commands.handle_line(1, "/start_bots").await;
        assert!(commands.handle_line(1, "/status").await.starts_with("status: running"));
        commands.watch().shutdown().await;
    }

    #[tokio::test]
    async fn test_filter_commands() {
        let commands = service();

        assert_eq!(commands.handle_line(1, "/show_filters").await, "no active filters");
        assert_eq!(
            commands.handle_line(1, "/add_filter tausch defekt").await,
            "added new filter(s): \n- tausch\n- defekt"
        );
        assert_eq!(
            commands.handle_line(1, "/show_filters").await,
            "current filter(s): \n- tausch\n- defekt"
        );
        assert!(commands
            .handle_line(1, "/add_filter (")
            .await
            .starts_with("invalid filter pattern"));
        assert_eq!(commands.handle_line(1, "/clear_filters").await, "cleared all filters");
        assert_eq!(commands.handle_line(1, "/show_filters").await, "no active filters");
    }
}
