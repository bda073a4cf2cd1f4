pub mod args;
pub mod auth;
pub mod containerfile;
pub mod errors;
pub mod extract;
pub mod reference;
pub mod registry;
pub mod resolve;
pub mod rewrite;
pub mod stages;
pub mod updater;
