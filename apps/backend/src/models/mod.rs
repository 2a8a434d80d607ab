mod card;
mod problem;
mod recommendation;
mod review;

pub use card::{Card, CardState, ReviewRating};
pub use problem::{CreateProblem, Problem, ProblemDifficulty, ProblemRow};
pub use recommendation::{
    FeedbackKind, FeedbackResponse, ProblemCandidate, RankedItem, RecommendRequest,
    RecommendationItem, RecommendationMeta, RecommendationResponse, Strategy, SubmitFeedback,
};
pub use review::{ReviewLog, ReviewType, SubmitReview, SubmitReviewResponse};
