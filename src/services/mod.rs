pub mod tracker;
pub mod subscriber;
pub mod registry;
pub mod scheduler;
pub mod watch_service;
pub mod command_service;
pub mod notification_service;

pub use tracker::Tracker;
pub use subscriber::{PollReport, SharedSubscriber, Subscriber, SubscriberId, TrackerSummary};
pub use registry::SubscriberRegistry;
pub use scheduler::{ErrorCallback, ItemsCallback, JobState, Scheduler};
pub use watch_service::{
    CycleCallbacks, CycleEvent, SubscriberStatus, TrackerRemoval, WatchService, WatchSettings,
};
pub use command_service::{split_target, ChatCommand, CommandError, CommandService};
pub use notification_service::NotificationService;
