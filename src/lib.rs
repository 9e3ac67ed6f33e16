//! This crate keeps a local store of calendar events consistent with a remote CalDAV collection.
//!
//! It provides a CalDAV client in the [`client`] module, that can be used as a stand-alone module.
//!
//! Because servers disagree on protocol details, the client is parameterized by a [`QuirkProfile`](quirks::QuirkProfile): \
//! a data value describing one provider's deviations (namespace handling, ETag quoting, CDATA, eventual consistency). \
//! The host picks a profile (usually from the server URL) and everything else adapts.
//!
//! On top of the client, the [`sync`] module drives full and incremental synchronisation against a
//! persistent [`SyncState`](sync::SyncState) cursor, and the [`push`] module queues local mutations,
//! coalesces them, and pushes them with ETag preconditions, parking conflicts for explicit resolution.
//!
//! Persistence stays on the host's side of the [`crate::traits`] interfaces: the engine returns a new
//! `SyncState` to persist atomically, and never mutates the previous one.

pub mod traits;

pub mod calendar;
mod event;
pub use event::Alarm;
pub use event::Attendee;
pub use event::Event;
pub use event::EventEnd;
pub use event::EventStatus;
pub use event::EventTime;
pub use event::ExtensionProp;
pub use event::Organizer;
pub use event::Transparency;
mod resource;
pub use resource::Etag;
pub use resource::EtagInfo;
pub use resource::EventWithMetadata;
pub use resource::ResourceHref;
mod error;
pub use error::DavError;
pub use error::DavResult;

pub mod quirks;
pub mod dav;
pub mod client;
pub use client::CalDavClient;
pub mod ical;
pub mod sync;
pub use sync::SyncEngine;
pub use sync::SyncState;
pub mod push;
pub use push::PushPipeline;

pub mod config;
