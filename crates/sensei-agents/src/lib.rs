pub mod agent;
pub mod service;

pub use agent::{
    AgentCategory, AgentFactory, AgentSet, AnswerOutcome, LearningAgent, SpeechAgent, SpeechTask,
    TutorAgent, TutorReply,
};
pub use service::AgentServiceFactory;
