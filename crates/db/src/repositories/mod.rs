//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod block_repo;
pub mod candidate_repo;
pub mod match_repo;
pub mod profile_repo;
pub mod swipe_repo;
pub mod user_repo;

pub use block_repo::BlockRepo;
pub use candidate_repo::CandidateRepo;
pub use match_repo::MatchRepo;
pub use profile_repo::ProfileRepo;
pub use swipe_repo::SwipeRepo;
pub use user_repo::UserRepo;
