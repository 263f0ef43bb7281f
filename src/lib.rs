//! rosbridge - client-side rosbridge protocol engine
//!
//! Topics, services and parameters of a ROS system, reached through one
//! rosbridge connection.
//!
//! ```no_run
//! use rosbridge::{Connection, ConnectionConfig};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), rosbridge::ClientError> {
//! let conn = Connection::new(ConnectionConfig::load()?.with_url(rosbridge::DEFAULT_URL))?;
//!
//! let chatter = conn.topic("/chatter", "std_msgs/String")?;
//! chatter.subscribe(|msg| println!("heard {}", msg["data"]));
//! chatter.publish(json!({"data": "hello"}));
//!
//! let sum = conn
//!     .service("/add_two_ints", "rospy_tutorials/AddTwoInts")
//!     .request(json!({"a": 1, "b": 2}))
//!     .await?;
//! println!("sum = {}", sum["sum"]);
//! # Ok(())
//! # }
//! ```

pub use rosbridge_client::*;
pub use rosbridge_protocol::{
    Compression, Decoder, Encoder, Frame, FrameDecoder, Message, ProtocolError, StatusLevel,
    DEFAULT_PORT, DEFAULT_URL,
};

pub use rosbridge_client as client;
pub use rosbridge_protocol as protocol;

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber filtered by `RUST_LOG`
/// (default `info`).
///
/// Returns false when a subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
        .is_ok()
}
