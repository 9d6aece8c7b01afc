pub mod broadcast;
pub mod config;
pub mod gateway;
pub mod manager;
pub mod protocol;
pub mod reaper;
pub mod registry;

pub use broadcast::Broadcaster;
pub use config::ServerConfig;
pub use gateway::Gateway;
pub use manager::AgentSessionManager;
pub use reaper::IdleReaper;
pub use registry::SessionRegistry;

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable agent stubs shared across server tests.

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;
    use sensei_agents::{
        AgentFactory, AnswerOutcome, LearningAgent, SpeechAgent, SpeechTask, TutorAgent,
        TutorReply,
    };
    use serde_json::json;

    #[derive(Default)]
    pub struct StubAgent {
        pub shutdowns: AtomicU32,
        pub calls: AtomicU32,
        pub adapt: bool,
        pub fatigue: bool,
        pub fail_calls: bool,
        pub fail_shutdown: bool,
    }

    #[async_trait]
    impl LearningAgent for StubAgent {
        async fn process_answer(
            &self,
            activity_id: &str,
            answer: &serde_json::Value,
            _context: Option<&serde_json::Value>,
        ) -> Result<AnswerOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_calls {
                anyhow::bail!("agent exploded");
            }
            Ok(AnswerOutcome {
                feedback: json!({"activity_id": activity_id, "received": answer}),
                adapted: self.adapt,
            })
        }

        async fn recommend(
            &self,
            _context: Option<&serde_json::Value>,
        ) -> Result<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_calls {
                anyhow::bail!("agent exploded");
            }
            Ok(json!({"next_activity": "act-9"}))
        }

        async fn shutdown(&self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.fail_shutdown {
                anyhow::bail!("shutdown refused");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TutorAgent for StubAgent {
        async fn respond(
            &self,
            input: &str,
            _current_activity: Option<&str>,
            _current_question: Option<&str>,
        ) -> Result<TutorReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_calls {
                anyhow::bail!("agent exploded");
            }
            Ok(TutorReply {
                message: format!("echo: {input}"),
                fatigue_detected: self.fatigue,
            })
        }

        async fn shutdown(&self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.fail_shutdown {
                anyhow::bail!("shutdown refused");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SpeechAgent for StubAgent {
        async fn analyze(
            &self,
            audio: &[u8],
            task: &SpeechTask,
        ) -> Result<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_calls {
                anyhow::bail!("agent exploded");
            }
            Ok(json!({"bytes": audio.len(), "task": task.task_type}))
        }

        async fn shutdown(&self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.fail_shutdown {
                anyhow::bail!("shutdown refused");
            }
            Ok(())
        }
    }

    pub struct StubFactory {
        pub adapt: bool,
        pub fatigue: bool,
        pub fail_calls: bool,
        pub fail_shutdown: bool,
        created: Mutex<Vec<Arc<StubAgent>>>,
    }

    impl StubFactory {
        pub fn new() -> Self {
            Self {
                adapt: false,
                fatigue: false,
                fail_calls: false,
                fail_shutdown: false,
                created: Mutex::new(Vec::new()),
            }
        }

        fn make(&self) -> Arc<StubAgent> {
            let agent = Arc::new(StubAgent {
                shutdowns: AtomicU32::new(0),
                calls: AtomicU32::new(0),
                adapt: self.adapt,
                fatigue: self.fatigue,
                fail_calls: self.fail_calls,
                fail_shutdown: self.fail_shutdown,
            });
            self.created.lock().unwrap().push(agent.clone());
            agent
        }

        pub fn created_count(&self) -> usize {
            self.created.lock().unwrap().len()
        }

        pub fn created_agents(&self) -> Vec<Arc<StubAgent>> {
            self.created.lock().unwrap().clone()
        }
    }

    impl AgentFactory for StubFactory {
        fn create_learning(&self, _learner_id: &str) -> Result<Arc<dyn LearningAgent>> {
            Ok(self.make())
        }

        fn create_tutor(&self, _learner_id: &str) -> Result<Arc<dyn TutorAgent>> {
            Ok(self.make())
        }

        fn create_speech(&self, _learner_id: &str) -> Result<Arc<dyn SpeechAgent>> {
            Ok(self.make())
        }
    }
}
