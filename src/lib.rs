//! Pure Rust async implementation of the Source server queries
//! [A2S_INFO](https://developer.valvesoftware.com/wiki/Server_queries#A2S_INFO) and
//! [A2S_PLAYER](https://developer.valvesoftware.com/wiki/Server_queries#A2S_PLAYER).
//!
//! ```no_run
//! use sourcequery::context::{ContextConfig, QueryContext};
//! use sourcequery::query::SourceQuery;
//!
//! let ctx = QueryContext::new(ContextConfig::default())?;
//! let client = SourceQuery::new(ctx.handle());
//!
//! let info = client.info(("nyc-1.us.uncletopia.com", 27015u16), None).wait()?;
//! println!("{} ({}/{})", info.hostname, info.players, info.maxplayers);
//!
//! ctx.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod context;
pub mod error;
pub mod info;
pub mod packet;
pub mod player;
pub mod query;
pub mod reader;

pub use context::{ContextConfig, QueryContext};
pub use error::SourceQueryError;
pub use info::ServerInfo;
pub use player::{Player, PlayerList, Players};
pub use query::{query_info, query_players, QueryHandle, SourceQuery, Target};
