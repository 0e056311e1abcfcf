//! The classdef object model.
//!
//! - [`class`]: class metadata, member resolution and the construction
//!   protocol ([`CdefClass`]).
//! - [`object`]: instances — scalar, array and meta representations behind
//!   one refcounted handle ([`CdefObject`]).
//! - [`manager`]: the registry mapping class names to loaded classes.
//! - [`builder`]: turns a parsed `classdef` block into a [`CdefClass`].
//! - [`meta`]: reflection entities surfaced to interpreted code as
//!   `meta.class` / `meta.property` / `meta.method` / `meta.package`.

pub mod builder;
pub mod class;
pub mod manager;
pub mod meta;
pub mod object;

pub use builder::make_meta_class;
pub use class::{Access, CdefClass, CdefMethod, CdefProperty, MemberMode};
pub use manager::CdefManager;
pub use meta::MetaEntity;
pub use object::{CdefObject, CtorState, ResolvedIndex};
