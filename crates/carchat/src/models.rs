//! These models represent the objects passed around by the agent
//!
//! There are a few related formats we need to interact with:
//! - chat messages posted by the browser, in the anthropic wire shape
//! - anthropic messages/tools, sent from the agent to the LLM
//! - tool calls and their typed results, exchanged with the car system
//!
//! We always immediately convert the wire formats into these internal structs using
//! to/from helpers, and only serialize back at the provider boundary.
pub mod message;
pub mod role;
pub mod tool;
