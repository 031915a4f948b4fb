// textmate-bind library - binds TextMate grammars and themes to editor widgets

pub mod config;
pub mod error;
pub mod primitives;
pub mod services;
pub mod view;

pub use error::BridgeError;
pub use primitives::grammar::{GrammarRegistry, GrammarSource, LoadPolicy};
pub use services::coordinator::{BindingCoordinator, UpdateOutcome, UpdateTicket};
pub use services::editor::{EditorEvent, EditorInstance, InstanceId, ModeTable, StyleRoot};
