//! HTTP API handlers for rankpool-alloc

pub mod health;
pub mod sessions;

pub use health::health_routes;
pub use sessions::{
    assign_session, create_session, get_session, get_validity, navigate, put_ranking,
    submit_session,
};
