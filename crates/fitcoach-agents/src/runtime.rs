use std::sync::Arc;

use fitcoach_common::{Error, Result};
use fitcoach_config::AppConfig;
use futures::StreamExt;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};

use crate::providers::{
    ChatMessage, ChatRole, ContentBlock, ContentBlockDelta, LlmProvider, LlmRequest, LlmResponse,
    LlmStreamResponse, MessagePart, STOP_REASON_TOOL_USE,
};
use crate::tools::{ToolCatalog, ToolRegistry, preamble_for};

/// Default ceiling on tool-use rounds per exchange.
const MAX_TOOL_ROUNDS: usize = 10;

const DEFAULT_MAX_TOKENS: u32 = 4096;

const EVENT_BUFFER: usize = 64;

/// Output of the streaming loop, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Status line for one tool invocation, sent before it runs.
    Preamble(String),
    /// One text fragment of the final answer.
    Message(String),
    /// Terminal: the answer is complete.
    Done,
    /// Terminal: the exchange failed.
    Error(String),
}

enum LoopState {
    AwaitingModel,
    ExecutingTools(LlmResponse),
    Done,
}

/// Runs conversations against one LLM provider with the tools of a registry.
pub struct AgentRuntime {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    model: String,
    system_prompt: Option<String>,
    max_tokens: u32,
    max_tool_rounds: usize,
    parallel_tool_calls: bool,
}

impl AgentRuntime {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: ToolRegistry, model: impl Into<String>) -> Self {
        Self {
            provider,
            tools: Arc::new(tools),
            model: model.into(),
            system_prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_tool_rounds: MAX_TOOL_ROUNDS,
            parallel_tool_calls: false,
        }
    }

    pub fn from_config(
        provider: Arc<dyn LlmProvider>,
        tools: ToolRegistry,
        config: &AppConfig,
    ) -> Self {
        let mut runtime = Self::new(provider, tools, config.llm.model.clone());
        if !config.llm.system_prompt.trim().is_empty() {
            runtime.set_system_prompt(config.llm.system_prompt.clone());
        }
        runtime.set_max_tokens(config.llm.max_tokens);
        runtime.set_max_tool_rounds(config.agent.max_tool_rounds);
        runtime.set_parallel_tool_calls(config.agent.parallel_tool_calls);
        runtime
    }

    pub fn set_system_prompt(&mut self, prompt: String) {
        self.system_prompt = Some(prompt);
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32) {
        self.max_tokens = max_tokens;
    }

    pub fn set_max_tool_rounds(&mut self, rounds: usize) {
        self.max_tool_rounds = rounds;
    }

    pub fn set_parallel_tool_calls(&mut self, enabled: bool) {
        self.parallel_tool_calls = enabled;
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn request(&self, messages: &[ChatMessage], catalog: Option<&ToolCatalog>) -> LlmRequest {
        LlmRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            system: self.system_prompt.clone(),
            max_tokens: Some(self.max_tokens),
            tools: catalog.map(|c| c.definitions().to_vec()).unwrap_or_default(),
        }
    }

    /// One model call, no tools. Returns the first text block verbatim.
    #[instrument(skip_all, fields(provider = self.provider.provider_id(), history = history.len()))]
    pub async fn process_message(&self, history: &[ChatMessage], user_text: &str) -> Result<String> {
        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(user_text));

        let response = self.provider.complete(&self.request(&messages, None)).await?;
        response
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| Error::Agent("model response contained no text".into()))
    }

    /// Resolve tool calls without streaming, then stream the final answer.
    ///
    /// Preambles and answer fragments go to `events`; the caller emits the
    /// terminal event. Returns the full answer text.
    #[instrument(skip_all, fields(provider = self.provider.provider_id(), history = history.len()))]
    pub async fn process_message_streaming(
        &self,
        history: &[ChatMessage],
        user_text: &str,
        events: mpsc::Sender<AgentEvent>,
    ) -> Result<String> {
        let catalog = self.tools.catalog().await;
        debug!("tool catalog has {} tool(s)", catalog.definitions().len());

        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(user_text));

        let mut rounds = 0usize;
        let mut state = LoopState::AwaitingModel;
        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    let response = self
                        .provider
                        .complete(&self.request(&messages, Some(&catalog)))
                        .await?;
                    if response.wants_tools() && has_tool_use(&response) {
                        LoopState::ExecutingTools(response)
                    } else {
                        LoopState::Done
                    }
                }
                LoopState::ExecutingTools(response) => {
                    if rounds >= self.max_tool_rounds {
                        return Err(Error::Agent(format!(
                            "tool loop exceeded maximum of {} rounds",
                            self.max_tool_rounds
                        )));
                    }
                    rounds += 1;
                    self.run_tool_round(&catalog, response, &mut messages, &events)
                        .await?;
                    LoopState::AwaitingModel
                }
                LoopState::Done => break,
            };
        }

        info!(rounds, "tool calls resolved, streaming final answer");
        self.stream_final_answer(&messages, &catalog, &events).await
    }

    /// Spawn the streaming loop and return its events, ending with exactly
    /// one `Done` or `Error`.
    pub fn stream_message(
        self: &Arc<Self>,
        history: Vec<ChatMessage>,
        user_text: String,
    ) -> ReceiverStream<AgentEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let runtime = Arc::clone(self);

        tokio::spawn(async move {
            let terminal = match runtime
                .process_message_streaming(&history, &user_text, tx.clone())
                .await
            {
                Ok(_) => AgentEvent::Done,
                Err(e) => {
                    warn!("streaming exchange failed: {e}");
                    AgentEvent::Error(e.to_string())
                }
            };
            let _ = tx.send(terminal).await;
        });

        ReceiverStream::new(rx)
    }

    async fn run_tool_round(
        &self,
        catalog: &ToolCatalog,
        response: LlmResponse,
        messages: &mut Vec<ChatMessage>,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<()> {
        let calls: Vec<(&str, &str, &serde_json::Value)> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect();

        for (_, name, input) in &calls {
            emit(events, AgentEvent::Preamble(preamble_for(name, input))).await?;
        }

        let outputs: Vec<String> = if self.parallel_tool_calls {
            join_all(
                calls
                    .iter()
                    .map(|(_, name, input)| catalog.invoke(name, (*input).clone())),
            )
            .await
        } else {
            let mut outputs = Vec::with_capacity(calls.len());
            for (_, name, input) in &calls {
                outputs.push(catalog.invoke(name, (*input).clone()).await);
            }
            outputs
        };

        let results: Vec<ContentBlock> = calls
            .iter()
            .zip(outputs)
            .map(|((id, _, _), content)| ContentBlock::ToolResult {
                tool_use_id: id.to_string(),
                content,
            })
            .collect();

        messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content: MessagePart::Parts(response.content.clone()),
        });
        messages.push(ChatMessage {
            role: ChatRole::User,
            content: MessagePart::Parts(results),
        });
        Ok(())
    }

    async fn stream_final_answer(
        &self,
        messages: &[ChatMessage],
        catalog: &ToolCatalog,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<String> {
        let mut stream = self
            .provider
            .stream(&self.request(messages, Some(catalog)))
            .await?;

        let mut answer = String::new();
        let mut stopped = false;
        while let Some(chunk) = stream.next().await {
            match chunk? {
                LlmStreamResponse::ContentBlockDelta {
                    delta: ContentBlockDelta::Text { text },
                    ..
                } if !text.is_empty() => {
                    answer.push_str(&text);
                    emit(events, AgentEvent::Message(text)).await?;
                }
                LlmStreamResponse::MessageStop { stop_reason, .. } => {
                    if stop_reason.as_deref() == Some(STOP_REASON_TOOL_USE) {
                        warn!("final answer stream asked for tools; ignoring");
                    }
                    stopped = true;
                }
                _ => {}
            }
        }

        // A connection dropped mid-answer must not look like a finished one.
        if !stopped {
            return Err(Error::Agent("model stream ended before message_stop".into()));
        }
        Ok(answer)
    }
}

fn has_tool_use(response: &LlmResponse) -> bool {
    response
        .content
        .iter()
        .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
}

async fn emit(events: &mpsc::Sender<AgentEvent>, event: AgentEvent) -> Result<()> {
    events
        .send(event)
        .await
        .map_err(|_| Error::Agent("event receiver dropped".into()))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use serde_json::json;

    use super::*;
    use crate::tools::testing::FakeProvider;

    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<LlmResponse>>>,
        fragments: Vec<&'static str>,
        requests: Mutex<Vec<LlmRequest>>,
        stream_requests: Mutex<Vec<LlmRequest>>,
        cut_off: bool,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<LlmResponse>>, fragments: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self::build(responses, fragments, false))
        }

        /// Streams the fragments, then ends without `message_stop`.
        fn cut_off(responses: Vec<Result<LlmResponse>>, fragments: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self::build(responses, fragments, true))
        }

        fn build(
            responses: Vec<Result<LlmResponse>>,
            fragments: Vec<&'static str>,
            cut_off: bool,
        ) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                fragments,
                requests: Mutex::new(Vec::new()),
                stream_requests: Mutex::new(Vec::new()),
                cut_off,
            }
        }

        fn requests(&self) -> Vec<LlmRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn stream_requests(&self) -> Vec<LlmRequest> {
            self.stream_requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn provider_id(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Agent("script exhausted".into())))
        }

        async fn stream(
            &self,
            request: &LlmRequest,
        ) -> Result<BoxStream<'static, Result<LlmStreamResponse>>> {
            self.stream_requests.lock().unwrap().push(request.clone());
            let mut chunks: Vec<Result<LlmStreamResponse>> =
                vec![Ok(LlmStreamResponse::MessageStart { usage: None })];
            for text in &self.fragments {
                chunks.push(Ok(LlmStreamResponse::ContentBlockDelta {
                    index: 0,
                    delta: ContentBlockDelta::Text {
                        text: text.to_string(),
                    },
                }));
            }
            if !self.cut_off {
                chunks.push(Ok(LlmStreamResponse::MessageStop {
                    stop_reason: Some("end_turn".into()),
                    usage: None,
                }));
            }
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    fn final_answer(text: &str) -> Result<LlmResponse> {
        Ok(LlmResponse {
            content: vec![ContentBlock::Text { text: text.into() }],
            model: "test".into(),
            usage: None,
            stop_reason: Some("end_turn".into()),
        })
    }

    fn tool_round(calls: &[(&str, &str, serde_json::Value)]) -> Result<LlmResponse> {
        let mut content = vec![ContentBlock::Text {
            text: "Let me check.".into(),
        }];
        for (id, name, input) in calls {
            content.push(ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: input.clone(),
            });
        }
        Ok(LlmResponse {
            content,
            model: "test".into(),
            usage: None,
            stop_reason: Some("tool_use".into()),
        })
    }

    fn registry(providers: Vec<Arc<FakeProvider>>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for p in providers {
            registry.register(p);
        }
        registry
    }

    async fn collect(runtime: &Arc<AgentRuntime>, user_text: &str) -> Vec<AgentEvent> {
        runtime
            .stream_message(Vec::new(), user_text.to_string())
            .collect()
            .await
    }

    fn tool_results(message: &ChatMessage) -> Vec<(String, String)> {
        match &message.content {
            MessagePart::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                    } => Some((tool_use_id.clone(), content.clone())),
                    _ => None,
                })
                .collect(),
            MessagePart::Text(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn final_answer_without_tools_is_streamed() {
        let llm = ScriptedProvider::new(
            vec![final_answer("Squats work your quads.")],
            vec!["Squats work ", "your quads, ", "glutes and core."],
        );
        let wger = Arc::new(FakeProvider::new("wger", vec!["search_exercises"]));
        let runtime = Arc::new(AgentRuntime::new(
            llm.clone(),
            registry(vec![wger.clone()]),
            "claude-test",
        ));

        let events = collect(&runtime, "What muscles does a squat work?").await;

        assert_eq!(
            events,
            vec![
                AgentEvent::Message("Squats work ".into()),
                AgentEvent::Message("your quads, ".into()),
                AgentEvent::Message("glutes and core.".into()),
                AgentEvent::Done,
            ]
        );
        assert_eq!(wger.call_count(), 0);

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].model, "claude-test");
        assert_eq!(
            requests[0].messages,
            vec![ChatMessage::user("What muscles does a squat work?")]
        );
        assert_eq!(llm.stream_requests()[0].messages, requests[0].messages);
    }

    #[tokio::test]
    async fn exercise_search_round_trip() {
        let llm = ScriptedProvider::new(
            vec![
                tool_round(&[(
                    "toolu_1",
                    "search_exercises",
                    json!({"muscle_names": ["quads", "glutes"]}),
                )]),
                final_answer("Try split squats."),
            ],
            vec!["Try ", "split squats."],
        );
        let wger = Arc::new(FakeProvider::new("wger", vec!["search_exercises"]));
        let runtime = Arc::new(AgentRuntime::new(
            llm.clone(),
            registry(vec![wger.clone()]),
            "claude-test",
        ));

        let events = collect(&runtime, "Give me leg exercises").await;

        assert_eq!(
            events,
            vec![
                AgentEvent::Preamble("Looking for exercises targeting quads and glutes...".into()),
                AgentEvent::Message("Try ".into()),
                AgentEvent::Message("split squats.".into()),
                AgentEvent::Done,
            ]
        );
        assert_eq!(wger.call_count(), 1);

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role, ChatRole::Assistant);
        assert_eq!(second[2].role, ChatRole::User);
        let results = tool_results(&second[2]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "toolu_1");
        assert!(results[0].1.starts_with("wger:search_exercises"));
        assert_eq!(llm.stream_requests()[0].messages, *second);
    }

    #[tokio::test]
    async fn every_tool_use_gets_one_result_in_order() {
        let llm = ScriptedProvider::new(
            vec![
                tool_round(&[
                    ("t1", "get_context", json!({})),
                    ("t2", "teleport", json!({"to": "mars"})),
                    ("t3", "get_latest_activity", json!({})),
                ]),
                final_answer("done"),
            ],
            vec!["done"],
        );
        let context = Arc::new(FakeProvider::new("context", vec!["get_context"]));
        let strava =
            Arc::new(FakeProvider::new("strava", vec!["get_latest_activity"]).failing());
        let runtime = Arc::new(AgentRuntime::new(
            llm.clone(),
            registry(vec![context.clone(), strava.clone()]),
            "m",
        ));

        let events = collect(&runtime, "how was my run?").await;

        let preambles: Vec<&AgentEvent> = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::Preamble(_)))
            .collect();
        assert_eq!(preambles.len(), 3);
        assert_eq!(
            events[..3],
            [
                AgentEvent::Preamble("Checking your saved preferences...".into()),
                AgentEvent::Preamble("Using teleport...".into()),
                AgentEvent::Preamble("Fetching your latest activity...".into()),
            ]
        );
        assert_eq!(events.last(), Some(&AgentEvent::Done));

        let requests = llm.requests();
        let results = tool_results(&requests[1].messages[2]);
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
        assert!(results[0].1.starts_with("context:get_context"));
        assert_eq!(results[1].1, "unknown tool: teleport");
        assert_eq!(results[2].1, "tool error: strava API returned 503");
        assert_eq!(context.call_count(), 1);
        assert_eq!(strava.call_count(), 1);
    }

    #[tokio::test]
    async fn parallel_dispatch_keeps_block_order() {
        let llm = ScriptedProvider::new(
            vec![
                tool_round(&[
                    ("a", "get_activities", json!({"type": "Run"})),
                    ("b", "get_context", json!({})),
                ]),
                final_answer("ok"),
            ],
            vec!["ok"],
        );
        let mut runtime = AgentRuntime::new(
            llm.clone(),
            registry(vec![
                Arc::new(FakeProvider::new("strava", vec!["get_activities"])),
                Arc::new(FakeProvider::new("context", vec!["get_context"])),
            ]),
            "m",
        );
        runtime.set_parallel_tool_calls(true);
        let runtime = Arc::new(runtime);

        let events = collect(&runtime, "summary").await;
        assert_eq!(events.last(), Some(&AgentEvent::Done));

        let results = tool_results(&llm.requests()[1].messages[2]);
        assert_eq!(results[0].0, "a");
        assert!(results[0].1.starts_with("strava:get_activities"));
        assert_eq!(results[1].0, "b");
        assert!(results[1].1.starts_with("context:get_context"));
    }

    #[tokio::test]
    async fn multiple_rounds_accumulate_history() {
        let llm = ScriptedProvider::new(
            vec![
                tool_round(&[("r1", "get_context", json!({}))]),
                tool_round(&[("r2", "search_exercises", json!({"muscle_group": "core"}))]),
                final_answer("plank"),
            ],
            vec!["plank"],
        );
        let runtime = Arc::new(AgentRuntime::new(
            llm.clone(),
            registry(vec![
                Arc::new(FakeProvider::new("context", vec!["get_context"])),
                Arc::new(FakeProvider::new("wger", vec!["search_exercises"])),
            ]),
            "m",
        ));

        let events = collect(&runtime, "core work?").await;
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[1],
            AgentEvent::Preamble("Looking for exercises targeting core...".into())
        );

        let requests = llm.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].messages.len(), 5);
    }

    #[tokio::test]
    async fn tool_round_ceiling_is_a_terminal_error() {
        let rounds: Vec<Result<LlmResponse>> = (0..5)
            .map(|i| tool_round(&[(format!("id{i}").as_str(), "get_context", json!({}))]))
            .collect();
        let llm = ScriptedProvider::new(rounds, vec![]);
        let mut runtime = AgentRuntime::new(
            llm.clone(),
            registry(vec![Arc::new(FakeProvider::new("context", vec!["get_context"]))]),
            "m",
        );
        runtime.set_max_tool_rounds(2);
        let runtime = Arc::new(runtime);

        let events = collect(&runtime, "loop forever").await;

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[2], AgentEvent::Error(msg) if msg.contains("maximum of 2 rounds")));
        assert!(!events.contains(&AgentEvent::Done));
        assert_eq!(llm.requests().len(), 3);
        assert!(llm.stream_requests().is_empty());
    }

    #[tokio::test]
    async fn model_failure_ends_stream_with_error() {
        let llm = ScriptedProvider::new(
            vec![Err(Error::Agent("Anthropic API error: status=529".into()))],
            vec![],
        );
        let runtime = Arc::new(AgentRuntime::new(llm, ToolRegistry::new(), "m"));

        let events = collect(&runtime, "hi").await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], AgentEvent::Error(msg) if msg.contains("status=529")));
    }

    #[tokio::test]
    async fn empty_registry_sends_no_tools() {
        let llm = ScriptedProvider::new(vec![final_answer("hi")], vec!["hi"]);
        let runtime = Arc::new(AgentRuntime::new(llm.clone(), ToolRegistry::new(), "m"));

        let events = collect(&runtime, "hello").await;

        assert_eq!(events, vec![AgentEvent::Message("hi".into()), AgentEvent::Done]);
        assert!(llm.requests()[0].tools.is_empty());
        assert!(llm.stream_requests()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn tool_use_stop_reason_without_blocks_is_final() {
        let llm = ScriptedProvider::new(
            vec![Ok(LlmResponse {
                content: vec![ContentBlock::Text { text: "hmm".into() }],
                model: "m".into(),
                usage: None,
                stop_reason: Some("tool_use".into()),
            })],
            vec!["hmm"],
        );
        let runtime = Arc::new(AgentRuntime::new(llm.clone(), ToolRegistry::new(), "m"));

        let events = collect(&runtime, "?").await;
        assert_eq!(events, vec![AgentEvent::Message("hmm".into()), AgentEvent::Done]);
        assert_eq!(llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn stream_cut_off_before_stop_is_an_error() {
        let llm = ScriptedProvider::cut_off(vec![final_answer("x")], vec!["Do 3 sets of"]);
        let runtime = Arc::new(AgentRuntime::new(llm, ToolRegistry::new(), "m"));

        let events = collect(&runtime, "leg day?").await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], AgentEvent::Message("Do 3 sets of".into()));
        match &events[1] {
            AgentEvent::Error(message) => {
                assert!(message.contains("ended before message_stop"))
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert!(!events.contains(&AgentEvent::Done));
    }

    #[tokio::test]
    async fn streaming_returns_full_answer_text() {
        let llm = ScriptedProvider::new(vec![final_answer("x")], vec!["line one\n", "line two"]);
        let runtime = AgentRuntime::new(llm, ToolRegistry::new(), "m");
        let (tx, mut rx) = mpsc::channel(8);

        let answer = runtime
            .process_message_streaming(&[], "two lines please", tx)
            .await
            .unwrap();

        assert_eq!(answer, "line one\nline two");
        assert_eq!(rx.recv().await, Some(AgentEvent::Message("line one\n".into())));
    }

    #[tokio::test]
    async fn single_shot_returns_first_text_without_tools() {
        let llm = ScriptedProvider::new(vec![final_answer("Hydrate well.")], vec![]);
        let runtime = AgentRuntime::new(
            llm.clone(),
            registry(vec![Arc::new(FakeProvider::new("context", vec!["get_context"]))]),
            "m",
        );
        let history = vec![
            ChatMessage::user("I run marathons"),
            ChatMessage::assistant("Nice!"),
        ];

        let answer = runtime
            .process_message(&history, "Any race-day tips?")
            .await
            .unwrap();

        assert_eq!(answer, "Hydrate well.");
        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_empty());
        assert_eq!(requests[0].messages.len(), 3);
        assert_eq!(requests[0].messages[2], ChatMessage::user("Any race-day tips?"));
        assert!(llm.stream_requests().is_empty());
    }

    #[tokio::test]
    async fn single_shot_propagates_model_errors() {
        let llm = ScriptedProvider::new(vec![Err(Error::Agent("Network error".into()))], vec![]);
        let runtime = AgentRuntime::new(llm, ToolRegistry::new(), "m");

        let err = runtime.process_message(&[], "hi").await.unwrap_err();
        assert!(err.to_string().contains("Network error"));
    }

    #[test]
    fn from_config_applies_settings() {
        let mut config = AppConfig::default();
        config.llm.model = "claude-3-5-haiku-latest".into();
        config.agent.max_tool_rounds = 3;
        config.agent.parallel_tool_calls = true;
        let llm = ScriptedProvider::new(vec![], vec![]);

        let runtime = AgentRuntime::from_config(llm, ToolRegistry::new(), &config);

        assert_eq!(runtime.model(), "claude-3-5-haiku-latest");
        assert_eq!(runtime.max_tool_rounds, 3);
        assert!(runtime.parallel_tool_calls);
        assert!(runtime.system_prompt.is_some());
    }
}
