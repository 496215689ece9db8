pub mod renewals;
pub mod root;
pub mod webhook;
