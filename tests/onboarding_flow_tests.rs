// Integration tests for the onboarding command surface
// These drive /api/invoke commands through route_command with scripted collaborators

#[cfg(test)]
mod onboarding_flow_tests {
    use async_trait::async_trait;
    use rand::rngs::mock::StepRng;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use twyne_lib::config::{StorageBackend, TwyneConfig};
    use twyne_lib::connections::{ConnectionError, JsonFetch, TokenExchange, SPOTIFY_API_URL};
    use twyne_lib::llm::{CallKind, ScriptedLlm};
    use twyne_lib::server::routes::route_command;
    use twyne_lib::server::{Collaborators, ServerAppState};
    use twyne_lib::shutdown::ShutdownState;
    use twyne_lib::storage::MemoryProfileStore;
    use twyne_lib::{Provider, TokenSet};

    const PROFILE_REPLY: &str = r#"{"name": "Mia", "occupation": "Nurse", "twyneTags": ["Runner", "Night owl"]}"#;

    struct FixedTokens;

    #[async_trait]
    impl TokenExchange for FixedTokens {
        async fn exchange(&self, _provider: Provider, code: &str) -> Result<TokenSet, ConnectionError> {
            if code == "expired" {
                return Err(ConnectionError::Token("invalid_grant".to_string()));
            }
            Ok(TokenSet {
                access_token: "tok".to_string(),
                refresh_token: None,
                expires_in: None,
            })
        }
    }

    struct SpotifyFixture;

    #[async_trait]
    impl JsonFetch for SpotifyFixture {
        async fn get_json(&self, url: &str, _access_token: &str) -> Result<Value, String> {
            let path = url
                .trim_start_matches(SPOTIFY_API_URL)
                .split('?')
                .next()
                .unwrap_or_default();
            match path {
                "/me" => Ok(json!({ "display_name": "Mia" })),
                "/me/top/artists" => Ok(json!({ "items": [
                    { "name": "Bonobo", "genres": ["downtempo", "electronica"] },
                ]})),
                "/me/top/tracks" => Ok(json!({ "items": [
                    { "name": "Kerala", "artists": [{ "name": "Bonobo" }] },
                ]})),
                "/me/player/recently-played" => Ok(json!({ "items": [] })),
                other => Err(format!("HTTP 404 for {}", other)),
            }
        }
    }

    struct App {
        state: ServerAppState,
        llm: Arc<ScriptedLlm>,
        store: Arc<MemoryProfileStore>,
    }

    fn scripted_llm() -> ScriptedLlm {
        ScriptedLlm::new()
            .with_default(CallKind::Turn, "Love that. What else fills your weekends?")
            .with_default(CallKind::Synthesis, PROFILE_REPLY)
            .with_default(CallKind::Mirror, r#"{"occupation": "Paramedic"}"#)
            .with_default(CallKind::Insight, "You unwind to warm electronic music.")
    }

    fn app_with(config: TwyneConfig, store: Arc<MemoryProfileStore>) -> App {
        let llm = Arc::new(scripted_llm());
        let collaborators = Collaborators {
            llm: llm.clone(),
            store: store.clone(),
            exchanger: Arc::new(FixedTokens),
            fetch: Arc::new(SpotifyFixture),
            sms: None,
            // Never fires the soft stop
            rng: Some(Box::new(StepRng::new(u64::MAX, 0))),
        };
        let state = ServerAppState::new(
            "test-token".to_string(),
            ShutdownState::new(),
            config,
            collaborators,
        );
        App { state, llm, store }
    }

    fn memory_config() -> TwyneConfig {
        let mut config = TwyneConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.connections.retry_delay_ms = 1;
        config
    }

    fn app() -> App {
        app_with(memory_config(), Arc::new(MemoryProfileStore::new()))
    }

    async fn invoke(app: &App, cmd: &str, args: Value) -> Result<Value, String> {
        route_command(cmd, args, &app.state).await
    }

    async fn start(app: &App) -> String {
        let session = invoke(app, "start_onboarding", json!({ "mode": "standard" }))
            .await
            .unwrap();
        session["sessionId"].as_str().unwrap().to_string()
    }

    async fn say(app: &App, session_id: &str, content: &str, user_id: Option<&str>) -> Value {
        invoke(
            app,
            "send_onboarding_message",
            json!({ "sessionId": session_id, "content": content, "userId": user_id }),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_onboarding_greets_the_user() {
        let app = app();
        let session = invoke(&app, "start_onboarding", json!({ "mode": "playful" }))
            .await
            .unwrap();

        assert_eq!(session["mode"], "playful");
        assert_eq!(session["channel"], "text");
        assert_eq!(session["state"]["status"], "active");
        assert_eq!(session["answerCount"], 0);
        assert_eq!(session["maxTurns"], 20);
        assert_eq!(session["messages"].as_array().unwrap().len(), 1);
        assert_eq!(session["messages"][0]["sender"], "assistant");
    }

    #[tokio::test]
    async fn test_full_conversation_completes_and_persists_once() {
        let app = app();
        let session_id = start(&app).await;
        let mut events = app.state.broadcaster.subscribe();

        let mut last = Value::Null;
        for i in 1..=20 {
            last = say(&app, &session_id, &format!("answer {}", i), Some("user-1")).await;
            if i < 20 {
                assert_eq!(last["outcome"]["type"], "continued");
            }
        }

        assert_eq!(last["outcome"]["type"], "completed");
        assert_eq!(last["outcome"]["persisted"], true);
        assert_eq!(last["outcome"]["profile"]["name"], "Mia");
        assert_eq!(last["session"]["state"]["status"], "complete");
        assert_eq!(last["session"]["progress"], 1.0);

        assert_eq!(app.llm.call_count(CallKind::Turn), 19);
        assert_eq!(app.llm.call_count(CallKind::Synthesis), 1);
        assert_eq!(app.store.write_count(), 1);

        // The closing message is the last thing the user sees
        let messages = last["session"]["messages"].as_array().unwrap();
        assert_eq!(messages.last().unwrap()["sender"], "assistant");

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.event);
        }
        assert_eq!(
            names.iter().filter(|n| *n == "onboarding:completed").count(),
            1
        );

        // A stored profile retires the live session
        assert_eq!(app.state.sessions.len().await, 0);
        let err = invoke(
            &app,
            "send_onboarding_message",
            json!({ "sessionId": session_id, "content": "one more", "userId": "user-1" }),
        )
        .await
        .unwrap_err();
        assert!(err.starts_with("Session not found"));

        let profile = invoke(&app, "get_profile", json!({ "userId": "user-1" }))
            .await
            .unwrap();
        assert_eq!(profile["occupation"], "Nurse");
        assert_eq!(profile["twyneTags"], json!(["Runner", "Night owl"]));
        assert_eq!(
            invoke(&app, "has_profile", json!({ "userId": "user-1" })).await.unwrap(),
            json!(true)
        );
    }

    #[tokio::test]
    async fn test_blank_message_changes_nothing() {
        let app = app();
        let session_id = start(&app).await;

        let response = say(&app, &session_id, "   ", None).await;
        assert_eq!(response["outcome"]["type"], "ignored");
        assert_eq!(response["session"]["answerCount"], 0);
        assert!(app.llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_finish_then_persist_after_sign_in() {
        let app = app();
        let session_id = start(&app).await;
        for content in ["I'm Mia", "I work nights", "I run at dawn"] {
            say(&app, &session_id, content, None).await;
        }

        let anonymous = invoke(&app, "finish_onboarding", json!({ "sessionId": session_id }))
            .await
            .unwrap();
        assert_eq!(anonymous["outcome"]["persisted"], false);
        assert_eq!(app.store.write_count(), 0);

        let signed_in = invoke(
            &app,
            "finish_onboarding",
            json!({ "sessionId": session_id, "userId": "user-7" }),
        )
        .await
        .unwrap();
        assert_eq!(signed_in["outcome"]["persisted"], true);
        assert_eq!(app.store.write_count(), 1);
        assert_eq!(app.llm.call_count(CallKind::Synthesis), 1);

        let raw = app.store.raw("user-7").await.unwrap();
        assert_eq!(raw["has_completed_onboarding"], true);
        assert_eq!(raw["prompt_mode"], "standard");
    }

    #[tokio::test]
    async fn test_switch_prompt_mode_discards_transcript() {
        let app = app();
        let session_id = start(&app).await;
        say(&app, &session_id, "hello there", None).await;

        let switched = invoke(
            &app,
            "switch_prompt_mode",
            json!({ "sessionId": session_id, "mode": "deep" }),
        )
        .await
        .unwrap();
        assert_eq!(switched["mode"], "deep");
        assert_eq!(switched["answerCount"], 0);
        assert_eq!(switched["messages"].as_array().unwrap().len(), 1);

        let bad_mode = invoke(
            &app,
            "switch_prompt_mode",
            json!({ "sessionId": session_id, "mode": "spicy" }),
        )
        .await;
        assert!(bad_mode.unwrap_err().starts_with("Invalid argument mode"));
    }

    #[tokio::test]
    async fn test_evaluate_coverage_falls_back_conservatively() {
        let app = app();
        let session_id = start(&app).await;

        // No coverage reply scripted: the evaluator reports everything missing
        let report = invoke(&app, "evaluate_coverage", json!({ "sessionId": session_id }))
            .await
            .unwrap();
        assert_eq!(report["enoughToStop"], false);
        assert_eq!(report["identity"], "Missing");
    }

    #[tokio::test]
    async fn test_mirror_profile_updates_only_named_fields() {
        let app = app();
        let session_id = start(&app).await;
        say(&app, &session_id, "I'm Mia", None).await;
        invoke(
            &app,
            "finish_onboarding",
            json!({ "sessionId": session_id, "userId": "user-3" }),
        )
        .await
        .unwrap();

        let mirrored = invoke(
            &app,
            "mirror_profile",
            json!({ "userId": "user-3", "statement": "I switched jobs, I'm a paramedic now" }),
        )
        .await
        .unwrap();
        assert_eq!(mirrored["changedFields"], json!(["occupation"]));
        assert_eq!(mirrored["profile"]["occupation"], "Paramedic");
        assert_eq!(mirrored["profile"]["name"], "Mia");
        assert_eq!(mirrored["sync"]["status"], "persisted");

        let stored = invoke(&app, "get_profile", json!({ "userId": "user-3" }))
            .await
            .unwrap();
        assert_eq!(stored["occupation"], "Paramedic");

        let missing = invoke(
            &app,
            "mirror_profile",
            json!({ "userId": "nobody", "statement": "hi" }),
        )
        .await;
        assert!(missing.unwrap_err().contains("No profile found"));
    }

    #[tokio::test]
    async fn test_connect_spotify_stores_summary() {
        let app = app();
        let summary = invoke(
            &app,
            "connect_spotify",
            json!({ "userId": "user-5", "code": "auth-code" }),
        )
        .await
        .unwrap();

        assert_eq!(summary["displayName"], "Mia");
        assert_eq!(summary["topTracks"], json!(["Kerala - Bonobo"]));
        assert_eq!(summary["insight"], "You unwind to warm electronic music.");

        let raw = app.store.raw("user-5").await.unwrap();
        assert_eq!(raw["spotify_data"]["topArtists"], json!(["Bonobo"]));

        let failed = invoke(
            &app,
            "connect_spotify",
            json!({ "userId": "user-5", "code": "expired" }),
        )
        .await;
        assert!(failed.unwrap_err().starts_with("Failed to connect Spotify"));
    }

    #[tokio::test]
    async fn test_anonymous_session_survives_restart() {
        let temp = TempDir::new().unwrap();
        let mut config = memory_config();
        config.storage.backend = StorageBackend::File;
        config.storage.data_dir = Some(temp.path().to_path_buf());
        let store = Arc::new(MemoryProfileStore::new());

        let session_id = {
            let first = app_with(config.clone(), store.clone());
            let session_id = start(&first).await;
            say(&first, &session_id, "I'm Mia", None).await;
            session_id
        };

        let second = app_with(config, store);
        let restored = invoke(
            &second,
            "get_onboarding_session",
            json!({ "sessionId": session_id }),
        )
        .await
        .unwrap();
        assert_eq!(restored["answerCount"], 1);
    }

    #[tokio::test]
    async fn test_unknown_session_and_command() {
        let app = app();
        let err = invoke(&app, "get_onboarding_session", json!({ "sessionId": "nope" }))
            .await
            .unwrap_err();
        assert_eq!(err, "Session not found: nope");

        let err = invoke(&app, "launch_rocket", json!({})).await.unwrap_err();
        assert_eq!(err, "Unknown command: launch_rocket");
    }
}
