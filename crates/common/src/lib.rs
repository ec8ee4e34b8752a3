// roomsync-common: room keys, the collaborative document schema, metadata
// projection and grant scoping shared by the server and the CLI.

pub mod document;
pub mod grant;
pub mod projection;
pub mod room;
pub mod types;
