pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;

pub use config::Config;
pub use error::{AppError, Result, StoreError};
pub use state::AppState;

pub use services::{
    CandidateSource, CandidateSourceProvider, CommentService, FeedAssembler, FollowService,
    InvalidationHub, PostService, ReactionAggregator, ScoreEngine, ScoreWeights,
};
