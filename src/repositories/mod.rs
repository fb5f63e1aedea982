//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations. Methods are generic over [`sea_orm::ConnectionTrait`] so the
//! merge finalizer can run several of them inside one transaction.

pub mod environment;
pub mod event;
pub mod group;
pub mod group_hash;
pub mod redirect;
pub mod tag;
pub mod task;

pub use environment::EnvironmentRepository;
pub use event::EventRepository;
pub use group::GroupRepository;
pub use group_hash::GroupHashRepository;
pub use redirect::RedirectRepository;
pub use tag::TagRepository;
pub use task::TaskRepository;
