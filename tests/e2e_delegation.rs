//! Delegated requests from the Razor server through the message target.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{FakeServer, eventually, test_settings};
use razor_bridge::RazorBridge;
use razor_bridge::bridge::IncomingMessageHandler;
use razor_bridge::document::{UpdateState, ViewId, VirtualDocumentKind};
use razor_bridge::text::TextChange;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc;
use url::Url;

const HOST: &str = "file:///app/Pages/Foo.razor";
const CSHARP_URI: &str = "file:///app/Pages/Foo.razor__virtual.cs";

fn host() -> Url {
    Url::parse(HOST).unwrap()
}

/// A bridge tracking `HOST` at `version` with an empty C# projection.
fn bridge_with_document(version: i32) -> RazorBridge {
    let bridge = RazorBridge::new(test_settings());
    bridge.documents().track_document(&host(), version, ViewId(1));
    bridge
        .documents()
        .update_virtual_document(
            &host(),
            VirtualDocumentKind::CSharp,
            &[],
            version,
            UpdateState::default(),
        )
        .unwrap();
    bridge
}

fn csharp_server(capabilities: Value) -> Arc<FakeServer> {
    FakeServer::new("csharp", &["RazorCSharp"], capabilities)
}

fn update_csharp(version: i32, changes: Value, previous_was_empty: bool) -> Value {
    json!({
        "hostDocumentFilePath": HOST,
        "hostDocumentVersion": version,
        "changes": changes,
        "previousWasEmpty": previous_was_empty,
    })
}

#[tokio::test]
async fn pending_semantic_tokens_request_resolves_after_buffer_update() {
    let bridge = bridge_with_document(5);
    let csharp = csharp_server(json!({ "semanticTokensProvider": { "range": true } }));
    csharp.respond(
        "textDocument/semanticTokens/range",
        json!({ "resultId": "r1", "data": [0, 0, 5, 0, 0] }),
    );
    bridge.register_server(csharp.clone());
    let target = bridge.message_target();

    let request = tokio::spawn({
        let target = target.clone();
        async move {
            target
                .handle_request(
                    "razor/semanticTokensRange",
                    json!({
                        "textDocument": { "uri": HOST },
                        "requiredHostDocumentVersion": 6,
                        "range": { "start": { "line": 0, "character": 0 },
                                   "end": { "line": 0, "character": 12 } }
                    }),
                    CancellationToken::new(),
                )
                .await
        }
    });
    let synchronizer = bridge.synchronizer().clone();
    eventually(|| synchronizer.pending_count() == 1).await;

    target
        .handle_notification(
            "razor/updateCSharpBuffer",
            update_csharp(
                6,
                json!([{ "span": { "start": 0, "length": 0 }, "newText": "class Foo {}" }]),
                true,
            ),
        )
        .await;

    let response = request.await.unwrap().unwrap();
    assert_eq!(
        response,
        json!({
            "resultId": "r1",
            "tokens": [0, 0, 5, 0, 0],
            "isFinalized": true,
            "hostDocumentSyncVersion": 6
        })
    );
    let sent = csharp.requests("textDocument/semanticTokens/range");
    assert_eq!(sent[0]["textDocument"]["uri"], CSHARP_URI);

    let snapshot = bridge.documents().try_get_document(&host()).unwrap();
    let csharp_doc = snapshot.virtual_document(VirtualDocumentKind::CSharp).unwrap();
    assert_eq!(csharp_doc.text(), "class Foo {}");
    assert_eq!(csharp_doc.host_document_version(), Some(6));
}

#[tokio::test]
async fn out_of_sync_semantic_tokens_report_last_known_version() {
    let mut settings = test_settings();
    settings.synchronization.timeout_ms = 50;
    let bridge = RazorBridge::new(settings);
    bridge.documents().track_document(&host(), 8, ViewId(1));
    bridge
        .documents()
        .update_virtual_document(
            &host(),
            VirtualDocumentKind::CSharp,
            &[TextChange::insert(0, "class Foo {}")],
            8,
            UpdateState::default(),
        )
        .unwrap();
    let csharp = csharp_server(json!({ "semanticTokensProvider": { "full": true } }));
    bridge.register_server(csharp.clone());

    let response = bridge
        .message_target()
        .handle_request(
            "razor/semanticTokens",
            json!({ "textDocument": { "uri": HOST }, "requiredHostDocumentVersion": 10 }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        response,
        json!({ "tokens": null, "isFinalized": false, "hostDocumentSyncVersion": 8 })
    );
    assert_eq!(csharp.request_count(), 0);
}

#[tokio::test]
async fn code_actions_only_consult_servers_that_resolve() {
    let bridge = bridge_with_document(1);
    let resolving = FakeServer::new(
        "roslyn",
        &["RazorCSharp"],
        json!({ "codeActionProvider": { "resolveProvider": true } }),
    );
    resolving.respond(
        "textDocument/codeAction",
        json!([{ "title": "Add using", "data": { "id": 1 } }]),
    );
    let non_resolving = FakeServer::new(
        "analyzers",
        &["RazorCSharp"],
        json!({ "codeActionProvider": true }),
    );
    non_resolving.respond("textDocument/codeAction", json!([{ "title": "Suppress" }]));
    let no_actions = FakeServer::new("other", &["RazorCSharp"], json!({}));
    bridge.register_server(resolving.clone());
    bridge.register_server(non_resolving.clone());
    bridge.register_server(no_actions.clone());

    let response = bridge
        .message_target()
        .handle_request(
            "razor/codeAction",
            json!({
                "hostDocumentVersion": 1,
                "languageKind": 0,
                "codeActionParams": {
                    "textDocument": { "uri": HOST },
                    "range": { "start": { "line": 0, "character": 0 },
                               "end": { "line": 0, "character": 0 } },
                    "context": { "diagnostics": [] }
                }
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response, json!([{ "title": "Add using", "data": { "id": 1 } }]));
    assert_eq!(non_resolving.request_count(), 0);
    assert_eq!(no_actions.request_count(), 0);
    let sent = resolving.requests("textDocument/codeAction");
    assert_eq!(sent[0]["textDocument"]["uri"], CSHARP_URI);
    assert_eq!(sent[0]["context"], json!({ "diagnostics": [] }));
}

#[tokio::test]
async fn code_actions_follow_configured_priorities() {
    let mut settings = test_settings();
    settings.code_action_priorities = vec!["second".to_string(), "first".to_string()];
    let bridge = RazorBridge::new(settings);
    bridge.documents().track_document(&host(), 1, ViewId(1));
    bridge
        .documents()
        .update_virtual_document(
            &host(),
            VirtualDocumentKind::CSharp,
            &[],
            1,
            UpdateState::default(),
        )
        .unwrap();
    let capabilities = json!({ "codeActionProvider": { "resolveProvider": true } });
    for (name, title) in [("first", "from first"), ("second", "from second")] {
        let server = FakeServer::new(name, &["RazorCSharp"], capabilities.clone());
        server.respond("textDocument/codeAction", json!([{ "title": title }]));
        bridge.register_server(server);
    }

    let response = bridge
        .message_target()
        .handle_request(
            "razor/codeAction",
            json!({
                "hostDocumentVersion": 1,
                "languageKind": "CSharp",
                "codeActionParams": { "textDocument": { "uri": HOST } }
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        response,
        json!([{ "title": "from second" }, { "title": "from first" }])
    );
}

#[tokio::test]
async fn resolve_code_action_returns_first_resolution() {
    let bridge = RazorBridge::new(test_settings());
    let capabilities = json!({ "codeActionProvider": { "resolveProvider": true } });
    let declining = FakeServer::new("declining", &["RazorCSharp"], capabilities.clone());
    let resolving = FakeServer::new("resolving", &["RazorCSharp"], capabilities);
    resolving.respond(
        "codeAction/resolve",
        json!({ "title": "Add using", "edit": { "changes": {} } }),
    );
    bridge.register_server(declining);
    bridge.register_server(resolving.clone());

    let response = bridge
        .message_target()
        .handle_request(
            "razor/resolveCodeAction",
            json!({ "languageKind": 0, "codeAction": { "title": "Add using" } }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response["edit"], json!({ "changes": {} }));
    assert_eq!(
        resolving.requests("codeAction/resolve"),
        vec![json!({ "title": "Add using" })]
    );
}

#[tokio::test]
async fn razor_kind_formatting_is_answered_without_delegation() {
    let bridge = bridge_with_document(1);
    let csharp = csharp_server(json!({ "documentRangeFormattingProvider": true }));
    bridge.register_server(csharp.clone());

    let response = bridge
        .message_target()
        .handle_request(
            "razor/rangeFormatting",
            json!({
                "kind": 2,
                "hostDocumentFilePath": HOST,
                "projectedRange": { "start": { "line": 0, "character": 0 },
                                    "end": { "line": 1, "character": 0 } },
                "options": { "tabSize": 4, "insertSpaces": true },
                "hostDocumentVersion": 1
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response, json!({ "edits": [] }));
    assert_eq!(csharp.request_count(), 0);
}

#[tokio::test]
async fn csharp_range_formatting_is_forwarded_to_the_projection() {
    let bridge = bridge_with_document(1);
    let csharp = csharp_server(json!({ "documentRangeFormattingProvider": true }));
    let edit = json!({
        "range": { "start": { "line": 0, "character": 5 },
                   "end": { "line": 0, "character": 7 } },
        "newText": " "
    });
    csharp.respond("textDocument/rangeFormatting", json!([edit.clone()]));
    bridge.register_server(csharp.clone());

    let response = bridge
        .message_target()
        .handle_request(
            "razor/rangeFormatting",
            json!({
                "kind": 0,
                "hostDocumentFilePath": HOST,
                "projectedRange": { "start": { "line": 0, "character": 0 },
                                    "end": { "line": 1, "character": 0 } },
                "options": { "tabSize": 4, "insertSpaces": true },
                "hostDocumentVersion": 1
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response, json!({ "edits": [edit] }));
    let sent = csharp.requests("textDocument/rangeFormatting");
    assert_eq!(sent[0]["textDocument"]["uri"], CSHARP_URI);
    assert_eq!(sent[0]["options"]["tabSize"], 4);
}

#[tokio::test]
async fn completion_passes_the_downstream_list_through() {
    let bridge = bridge_with_document(3);
    let csharp = csharp_server(json!({ "completionProvider": { "triggerCharacters": ["."] } }));
    csharp.respond(
        "textDocument/completion",
        json!({ "isIncomplete": false, "items": [{ "label": "ToString" }] }),
    );
    bridge.register_server(csharp.clone());

    let response = bridge
        .message_target()
        .handle_request(
            "razor/completion",
            json!({
                "hostDocumentFilePath": HOST,
                "hostDocumentVersion": 3,
                "projectedKind": 0,
                "projectedPosition": { "line": 0, "character": 0 },
                "context": { "triggerKind": 2, "triggerCharacter": "." }
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response["items"][0]["label"], "ToString");
    let sent = csharp.requests("textDocument/completion");
    assert_eq!(sent[0]["context"]["triggerCharacter"], ".");
}

#[tokio::test]
async fn requests_for_unknown_documents_get_empty_answers() {
    let bridge = RazorBridge::new(test_settings());
    let csharp = csharp_server(json!({ "documentRangeFormattingProvider": true }));
    bridge.register_server(csharp.clone());

    let response = bridge
        .message_target()
        .handle_request(
            "razor/rangeFormatting",
            json!({
                "kind": 0,
                "hostDocumentFilePath": "/app/Pages/Missing.razor",
                "projectedRange": { "start": { "line": 0, "character": 0 },
                                    "end": { "line": 0, "character": 0 } },
                "options": { "tabSize": 4, "insertSpaces": true },
                "hostDocumentVersion": 1
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response, json!({ "edits": [] }));
    assert_eq!(csharp.request_count(), 0);
}

#[tokio::test]
async fn workspace_configuration_is_polyfilled_per_section() {
    let mut settings = test_settings();
    settings.editor.indent_with_tabs = true;
    settings.editor.indent_size = 2;
    settings.razor = json!({ "format": { "enable": true } });
    let bridge = RazorBridge::new(settings);

    let response = bridge
        .message_target()
        .handle_request(
            "workspace/configuration",
            json!({ "items": [
                { "section": "vs.editor.razor" },
                { "section": "razor" },
                { "section": "html" },
                {}
            ] }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        response,
        json!([
            { "indentWithTabs": true, "indentSize": 2 },
            { "format": { "enable": true } },
            {},
            {}
        ])
    );
}

#[tokio::test]
async fn unknown_methods_and_malformed_params_are_rpc_errors() {
    let bridge = RazorBridge::new(test_settings());
    let target = bridge.message_target();

    let unknown = target
        .handle_request("razor/unknown", json!({}), CancellationToken::new())
        .await;
    assert_eq!(unknown, Err(jsonrpc::Error::method_not_found()));

    let malformed = target
        .handle_request(
            "razor/rangeFormatting",
            json!({ "kind": "Fortran" }),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(malformed.code, jsonrpc::ErrorCode::InvalidParams);
}

#[tokio::test]
async fn map_spans_asks_the_razor_server_for_ranges() {
    let bridge = RazorBridge::new(test_settings());
    bridge.documents().track_document(&host(), 1, ViewId(1));
    bridge
        .documents()
        .update_host_document(&host(), 1, "<p>@DateTime.Now</p>");
    bridge
        .documents()
        .update_virtual_document(
            &host(),
            VirtualDocumentKind::CSharp,
            &[TextChange::insert(0, "__o = DateTime.Now;")],
            1,
            UpdateState::default(),
        )
        .unwrap();
    let razor = FakeServer::new("razor", &[], json!({}));
    razor.respond(
        "razor/mapToDocumentRanges",
        json!({
            "ranges": [
                { "start": { "line": 0, "character": 4 }, "end": { "line": 0, "character": 16 } },
                { "start": { "line": -1, "character": -1 }, "end": { "line": -1, "character": -1 } }
            ],
            "hostDocumentVersion": 1
        }),
    );
    bridge.register_server(razor.clone());

    let response = bridge
        .message_target()
        .handle_request(
            "razor/mapSpans",
            json!({
                "hostDocumentFilePath": "/app/Pages/Foo.razor",
                "kind": 0,
                "spans": [{ "start": 6, "length": 12 }, { "start": 0, "length": 3 }]
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        response,
        json!({
            "mappedSpans": [
                {
                    "filePath": "/app/Pages/Foo.razor",
                    "range": { "start": { "line": 0, "character": 4 },
                               "end": { "line": 0, "character": 16 } },
                    "span": { "start": 4, "length": 12 }
                },
                { "filePath": "", "range": null, "span": null }
            ]
        })
    );
    let sent = razor.requests("razor/mapToDocumentRanges");
    assert_eq!(sent[0]["razorDocumentUri"], HOST);
    assert_eq!(sent[0]["kind"], 0);
}

#[tokio::test]
async fn buffer_updates_for_closed_documents_are_ignored() {
    let bridge = RazorBridge::new(test_settings());
    bridge
        .message_target()
        .handle_notification(
            "razor/updateHtmlBuffer",
            json!({
                "hostDocumentFilePath": HOST,
                "hostDocumentVersion": 1,
                "changes": [{ "span": { "start": 0, "length": 0 }, "newText": "<p></p>" }],
                "previousWasEmpty": true
            }),
        )
        .await;
    assert!(bridge.documents().try_get_document(&host()).is_none());
}

#[tokio::test]
async fn cancelled_delegation_is_reported_as_cancelled() {
    let mut settings = test_settings();
    settings.synchronization.timeout_ms = 5_000;
    let bridge = RazorBridge::new(settings);
    bridge.documents().track_document(&host(), 1, ViewId(1));
    let cancel = CancellationToken::new();

    let request = tokio::spawn({
        let target = bridge.message_target();
        let cancel = cancel.clone();
        async move {
            target
                .handle_request(
                    "razor/completion",
                    json!({
                        "hostDocumentFilePath": HOST,
                        "hostDocumentVersion": 2,
                        "projectedKind": 0,
                        "projectedPosition": { "line": 0, "character": 0 }
                    }),
                    cancel,
                )
                .await
        }
    });
    let synchronizer = bridge.synchronizer().clone();
    eventually(|| synchronizer.pending_count() == 1).await;
    cancel.cancel();

    let response = tokio::time::timeout(Duration::from_secs(1), request)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, Ok(Value::Null));
    assert_eq!(bridge.synchronizer().pending_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn projection_changes_reach_the_server_before_the_waiting_request() {
    for _ in 0..50 {
        let mut settings = test_settings();
        settings.synchronization.timeout_ms = 5_000;
        let bridge = RazorBridge::new(settings);
        let csharp = csharp_server(json!({ "documentRangeFormattingProvider": true }));
        bridge.register_server(csharp.clone());
        bridge.documents().track_document(&host(), 1, ViewId(1));
        let target = bridge.message_target();
        target
            .handle_notification(
                "razor/updateCSharpBuffer",
                update_csharp(
                    1,
                    json!([{ "span": { "start": 0, "length": 0 }, "newText": "class Foo {}" }]),
                    true,
                ),
            )
            .await;

        let request = tokio::spawn({
            let target = target.clone();
            async move {
                target
                    .handle_request(
                        "razor/rangeFormatting",
                        json!({
                            "kind": 0,
                            "hostDocumentFilePath": HOST,
                            "projectedRange": { "start": { "line": 0, "character": 0 },
                                                "end": { "line": 0, "character": 13 } },
                            "options": { "tabSize": 4, "insertSpaces": true },
                            "hostDocumentVersion": 2
                        }),
                        CancellationToken::new(),
                    )
                    .await
            }
        });
        let synchronizer = bridge.synchronizer().clone();
        eventually(|| synchronizer.pending_count() == 1).await;

        target
            .handle_notification(
                "razor/updateCSharpBuffer",
                update_csharp(
                    2,
                    json!([{ "span": { "start": 11, "length": 0 }, "newText": " " }]),
                    false,
                ),
            )
            .await;
        request.await.unwrap().unwrap();

        let received = csharp.received();
        let change = received.iter().position(|m| m == "textDocument/didChange");
        let format = received.iter().position(|m| m == "textDocument/rangeFormatting");
        assert!(
            matches!((change, format), (Some(change), Some(format)) if change < format),
            "didChange must precede the request: {received:?}"
        );
    }
}

#[tokio::test]
async fn desynchronizing_update_fails_pending_requests_early() {
    let mut settings = test_settings();
    settings.synchronization.timeout_ms = 5_000;
    let bridge = RazorBridge::new(settings);
    bridge.documents().track_document(&host(), 1, ViewId(1));
    let csharp = csharp_server(json!({ "semanticTokensProvider": { "full": true } }));
    bridge.register_server(csharp.clone());
    let target = bridge.message_target();
    target
        .handle_notification(
            "razor/updateCSharpBuffer",
            update_csharp(
                1,
                json!([{ "span": { "start": 0, "length": 0 }, "newText": "class Foo {}" }]),
                true,
            ),
        )
        .await;

    let request = tokio::spawn({
        let target = target.clone();
        async move {
            target
                .handle_request(
                    "razor/semanticTokens",
                    json!({ "textDocument": { "uri": HOST }, "requiredHostDocumentVersion": 2 }),
                    CancellationToken::new(),
                )
                .await
        }
    });
    let synchronizer = bridge.synchronizer().clone();
    eventually(|| synchronizer.pending_count() == 1).await;

    // Claims an empty buffer but is not a full-content update.
    target
        .handle_notification(
            "razor/updateCSharpBuffer",
            update_csharp(
                2,
                json!([
                    { "span": { "start": 0, "length": 0 }, "newText": "class" },
                    { "span": { "start": 5, "length": 0 }, "newText": " Bar {}" }
                ]),
                true,
            ),
        )
        .await;

    let response = tokio::time::timeout(Duration::from_secs(1), request)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        response,
        json!({ "tokens": null, "isFinalized": false, "hostDocumentSyncVersion": 1 })
    );
    assert_eq!(csharp.request_count(), 0);
    assert_eq!(bridge.synchronizer().pending_count(), 0);
}

#[tokio::test]
async fn missing_projection_gives_up_after_the_creation_timeout() {
    let mut settings = test_settings();
    settings.synchronization.timeout_ms = 5_000;
    settings.synchronization.creation_timeout_ms = 50;
    let bridge = RazorBridge::new(settings);
    bridge.documents().track_document(&host(), 1, ViewId(1));
    let csharp = csharp_server(json!({ "completionProvider": {} }));
    bridge.register_server(csharp.clone());

    let started = Instant::now();
    let response = tokio::time::timeout(
        Duration::from_secs(1),
        bridge.message_target().handle_request(
            "razor/completion",
            json!({
                "hostDocumentFilePath": HOST,
                "hostDocumentVersion": 1,
                "projectedKind": 0,
                "projectedPosition": { "line": 0, "character": 0 }
            }),
            CancellationToken::new(),
        ),
    )
    .await
    .unwrap();

    assert_eq!(response, Ok(Value::Null));
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(csharp.request_count(), 0);
    assert_eq!(bridge.synchronizer().pending_count(), 0);
}

#[tokio::test]
async fn request_waits_for_the_projection_to_be_created() {
    let bridge = RazorBridge::new(test_settings());
    bridge.documents().track_document(&host(), 1, ViewId(1));
    let csharp = csharp_server(json!({ "completionProvider": {} }));
    csharp.respond(
        "textDocument/completion",
        json!({ "isIncomplete": false, "items": [{ "label": "Foo" }] }),
    );
    bridge.register_server(csharp.clone());
    let target = bridge.message_target();

    let request = tokio::spawn({
        let target = target.clone();
        async move {
            target
                .handle_request(
                    "razor/completion",
                    json!({
                        "hostDocumentFilePath": HOST,
                        "hostDocumentVersion": 1,
                        "projectedKind": 0,
                        "projectedPosition": { "line": 0, "character": 0 }
                    }),
                    CancellationToken::new(),
                )
                .await
        }
    });
    let synchronizer = bridge.synchronizer().clone();
    eventually(|| synchronizer.pending_count() == 1).await;

    target
        .handle_notification(
            "razor/updateCSharpBuffer",
            update_csharp(
                1,
                json!([{ "span": { "start": 0, "length": 0 }, "newText": "class Foo {}" }]),
                true,
            ),
        )
        .await;

    let response = request.await.unwrap().unwrap();
    assert_eq!(response["items"][0]["label"], "Foo");
}

#[tokio::test]
async fn partial_semantic_tokens_are_passed_on_as_not_finalized() {
    let bridge = bridge_with_document(2);
    let csharp = csharp_server(json!({ "semanticTokensProvider": { "full": true } }));
    csharp.respond(
        "textDocument/semanticTokens/full",
        json!({ "resultId": "p1", "data": [1, 2, 3, 0, 0], "isFinalized": false }),
    );
    bridge.register_server(csharp.clone());

    let response = bridge
        .message_target()
        .handle_request(
            "razor/semanticTokens",
            json!({ "textDocument": { "uri": HOST }, "requiredHostDocumentVersion": 2 }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        response,
        json!({
            "resultId": "p1",
            "tokens": [1, 2, 3, 0, 0],
            "isFinalized": false,
            "hostDocumentSyncVersion": 2
        })
    );
}

#[tokio::test]
async fn semantic_tokens_delta_forwards_the_previous_result() {
    let bridge = bridge_with_document(2);
    let csharp = csharp_server(json!({ "semanticTokensProvider": { "full": { "delta": true } } }));
    let edits = json!([{ "start": 0, "deleteCount": 5, "data": [0, 0, 3, 1, 0] }]);
    csharp.respond(
        "textDocument/semanticTokens/full/delta",
        json!({ "resultId": "r2", "edits": edits.clone() }),
    );
    bridge.register_server(csharp.clone());

    let response = bridge
        .message_target()
        .handle_request(
            "razor/semanticTokensDelta",
            json!({
                "textDocument": { "uri": HOST },
                "requiredHostDocumentVersion": 2,
                "previousResultId": "r1"
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        response,
        json!({
            "resultId": "r2",
            "tokens": null,
            "edits": edits,
            "isFinalized": true,
            "hostDocumentSyncVersion": 2
        })
    );
    let sent = csharp.requests("textDocument/semanticTokens/full/delta");
    assert_eq!(sent[0]["previousResultId"], "r1");
    assert_eq!(sent[0]["textDocument"]["uri"], CSHARP_URI);
}

#[tokio::test]
async fn buffer_update_with_overflowing_span_flags_the_projection() {
    let bridge = bridge_with_document(1);
    bridge
        .message_target()
        .handle_notification(
            "razor/updateCSharpBuffer",
            update_csharp(
                2,
                json!([{ "span": { "start": u64::MAX, "length": 2 }, "newText": "x" }]),
                false,
            ),
        )
        .await;

    let snapshot = bridge.documents().try_get_document(&host()).unwrap();
    let csharp_doc = snapshot.virtual_document(VirtualDocumentKind::CSharp).unwrap();
    assert!(csharp_doc.is_desynchronized());
    assert_eq!(csharp_doc.host_document_version(), Some(1));
}
