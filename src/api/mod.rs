mod feed;
mod server;

pub use feed::FeedSource;
pub use server::{start_server, RelayState};
