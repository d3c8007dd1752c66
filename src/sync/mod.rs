//! Live event synchronization: the replica, what refreshes it, and the
//! session that owns both for one screen lifetime.

pub mod feed;
pub mod gate;
pub mod notice;
pub mod refresh;
pub mod replica;
pub mod session;


pub use feed::FeedSubscriber;
pub use gate::RenderGate;
pub use notice::{Notice, NoticeLevel};
pub use refresh::{FetchPlan, RefreshController};
pub use replica::ReplicaStore;
pub use session::{
    MapSession, SessionConfig, SessionError, SessionEvent, SessionExit, SessionHandle, SessionView,
};
