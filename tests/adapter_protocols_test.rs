use assistant_stream::adapters::{AgUiAdapter, NativeAdapter, OpenAiAdapter, StreamProtocolAdapter};
use assistant_stream::sink::MemorySink;
use assistant_stream::{
    AssistantMessage, Delta, ProtocolKind, StreamConfig, StreamHandler, StreamedResponse,
};
use bytes::Bytes;
use futures_util::StreamExt;

fn body(text: &str) -> StreamedResponse {
    StreamedResponse::from_chunks(vec![Bytes::from(text.to_string())])
}

/// Splits `text` into pieces of `size` bytes regardless of char or line boundaries.
fn body_in_pieces(text: &str, size: usize) -> StreamedResponse {
    let bytes = text.as_bytes().to_vec();
    let chunks: Vec<Bytes> = bytes.chunks(size).map(Bytes::copy_from_slice).collect();
    StreamedResponse::from_chunks(chunks)
}

async fn run_with(adapter: &dyn StreamProtocolAdapter, response: StreamedResponse) -> AssistantMessage {
    let mut sink = MemorySink::new();
    let outcome = StreamHandler::handle_stream(
        response,
        adapter,
        &mut sink,
        &StreamConfig::default(),
        None,
    )
    .await
    .expect("stream should complete");
    outcome.into_message().expect("not cancelled")
}

async fn collect_deltas(adapter: &dyn StreamProtocolAdapter, response: StreamedResponse) -> Vec<Delta> {
    let mut stream = adapter
        .parse(response, &StreamConfig::default())
        .expect("body present");
    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
        out.push(item.expect("no stream error"));
    }
    out
}

const SEARCH_CATS: &str = concat!(
    "data: {\"type\":\"TOOL_CALL_START\",\"toolCallId\":\"a\",\"toolCallName\":\"search\"}\n\n",
    "data: {\"type\":\"TOOL_CALL_ARGS\",\"toolCallId\":\"a\",\"delta\":\"{\\\"q\\\":\"}\n\n",
    "data: {\"type\":\"TOOL_CALL_ARGS\",\"toolCallId\":\"a\",\"delta\":\"\\\"cats\\\"}\"}\n\n",
);

#[tokio::test]
async fn generic_tool_call_scenario() {
    let message = run_with(&AgUiAdapter, body(SEARCH_CATS)).await;
    let json = serde_json::to_value(&message.tool_calls).unwrap();
    assert_eq!(
        json,
        serde_json::json!([{
            "id": "a",
            "type": "function",
            "function": {"name": "search", "arguments": "{\"q\":\"cats\"}"}
        }])
    );
    assert_eq!(
        message.tool_calls[0].parsed_arguments(),
        Some(serde_json::json!({"q": "cats"}))
    );
}

#[tokio::test]
async fn tool_args_are_chunking_invariant() {
    let expected = run_with(&AgUiAdapter, body(SEARCH_CATS)).await;
    for size in [1, 2, 3, 7, 64] {
        let message = run_with(&AgUiAdapter, body_in_pieces(SEARCH_CATS, size)).await;
        assert_eq!(message.tool_calls, expected.tool_calls, "chunk size {}", size);
    }
}

#[tokio::test]
async fn tool_args_concatenate_across_many_frames() {
    let pieces = ["{\\\"path\\\"", ":", " \\\"/tmp", "/x\\\"", "}"];
    let mut text = String::from(
        "data: {\"type\":\"TOOL_CALL_START\",\"toolCallId\":\"t\",\"toolCallName\":\"read\"}\n\n",
    );
    for p in pieces {
        text.push_str(&format!(
            "data: {{\"type\":\"TOOL_CALL_ARGS\",\"toolCallId\":\"t\",\"delta\":\"{}\"}}\n\n",
            p
        ));
    }
    let message = run_with(&AgUiAdapter, body(&text)).await;
    assert_eq!(message.tool_calls[0].function.arguments, "{\"path\": \"/tmp/x\"}");
}

#[tokio::test]
async fn malformed_generic_frame_is_skipped() {
    let text = concat!(
        "data: {\"type\":\"TEXT_MESSAGE_CONTENT\",\"delta\":\"a\"}\n\n",
        "data: {bad json\n\n",
        "data: {\"type\":\"STATE_DELTA\",\"delta\":[]}\n\n",
        "data: {\"type\":\"TEXT_MESSAGE_CONTENT\",\"delta\":\"b\"}\n\n",
        "data: {\"type\":\"RUN_ERROR\",\"message\":\"soft failure\"}\n\n",
        "data: {\"type\":\"TEXT_MESSAGE_CONTENT\",\"delta\":\"c\"}\n\n",
    );
    let message = run_with(&AgUiAdapter, body(text)).await;
    assert_eq!(message.text(), "abc");
}

#[tokio::test]
async fn generic_message_start_sets_id() {
    let text = concat!(
        "data: {\"type\":\"TEXT_MESSAGE_START\",\"messageId\":\"srv-1\",\"role\":\"assistant\"}\n\n",
        "data: {\"type\":\"TEXT_MESSAGE_CONTENT\",\"messageId\":\"srv-1\",\"delta\":\"hi\"}\n\n",
        "data: {\"type\":\"TEXT_MESSAGE_END\",\"messageId\":\"srv-1\"}\n\n",
        "data: [DONE]\n\n",
    );
    let message = run_with(&AgUiAdapter, body(text)).await;
    assert_eq!(message.id, "srv-1");
    assert_eq!(message.text(), "hi");
}

#[tokio::test]
async fn openai_index_scenario() {
    let text = concat!(
        "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"role\":\"assistant\",\"tool_calls\":[{\"index\":0,\"id\":\"tc1\",\"function\":{\"name\":\"f\"}}]}}]}\n\n",
        "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{}\"}}]}}]}\n\n",
        "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    let message = run_with(&OpenAiAdapter, body(text)).await;
    assert_eq!(message.tool_calls.len(), 1);
    assert_eq!(message.tool_calls[0].id, "tc1");
    assert_eq!(message.tool_calls[0].function.name, "f");
    assert_eq!(message.tool_calls[0].function.arguments, "{}");
}

#[tokio::test]
async fn openai_text_and_sessions_are_independent() {
    let text = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    );
    let first = collect_deltas(&OpenAiAdapter, body(text)).await;
    let second = collect_deltas(&OpenAiAdapter, body(text)).await;
    let id_of = |deltas: &[Delta]| match &deltas[0] {
        Delta::MessageStart { message_id } => message_id.clone(),
        other => panic!("expected MessageStart, got {:?}", other),
    };
    assert_ne!(id_of(&first), id_of(&second));
    assert_eq!(first.len(), 4);
    assert_eq!(first[3], Delta::TextEnd);

    let message = run_with(&OpenAiAdapter, body(text)).await;
    assert_eq!(message.text(), "Hello");
}

#[tokio::test]
async fn openai_responses_function_call() {
    let text = concat!(
        "event: response.created\ndata: {\"type\":\"response.created\",\"response\":{\"id\":\"resp_1\"}}\n\n",
        "event: response.output_item.added\ndata: {\"type\":\"response.output_item.added\",\"item\":{\"type\":\"message\",\"id\":\"msg_1\",\"role\":\"assistant\"}}\n\n",
        "event: response.output_text.delta\ndata: {\"type\":\"response.output_text.delta\",\"item_id\":\"msg_1\",\"delta\":\"Looking\"}\n\n",
        "event: response.output_item.added\ndata: {\"type\":\"response.output_item.added\",\"item\":{\"type\":\"function_call\",\"id\":\"fc_1\",\"call_id\":\"call_9\",\"name\":\"search\"}}\n\n",
        "event: response.function_call_arguments.delta\ndata: {\"type\":\"response.function_call_arguments.delta\",\"item_id\":\"fc_1\",\"delta\":\"{\\\"q\\\":\"}\n\n",
        "event: response.function_call_arguments.delta\ndata: {\"type\":\"response.function_call_arguments.delta\",\"item_id\":\"fc_1\",\"delta\":\"1}\"}\n\n",
        "event: response.completed\ndata: {\"type\":\"response.completed\",\"response\":{}}\n\n",
    );
    let adapter = ProtocolKind::OpenAiResponses.adapter();
    let message = run_with(adapter.as_ref(), body(text)).await;
    assert_eq!(message.id, "msg_1");
    assert_eq!(message.text(), "Looking");
    assert_eq!(message.tool_calls[0].id, "call_9");
    assert_eq!(message.tool_calls[0].function.arguments, "{\"q\":1}");
}

#[tokio::test]
async fn native_chunked_multibyte_text() {
    let text = "event: T\ndata: naïve café ☕\n\nevent: T\ndata: !\n\n";
    for size in [1, 2, 5] {
        let message = run_with(&NativeAdapter, body_in_pieces(text, size)).await;
        assert_eq!(message.text(), "naïve café ☕!");
    }
}

#[tokio::test]
async fn openai_empty_tool_call_id_continues_existing_call() {
    let text = concat!(
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"tc1\",\"function\":{\"name\":\"f\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"\",\"function\":{\"arguments\":\"{\\\"a\\\":\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":null,\"function\":{\"arguments\":\"1}\"}}]}}]}\n\n",
        "data: [DONE]\n\n",
    );
    let message = run_with(&OpenAiAdapter, body(text)).await;
    assert_eq!(message.tool_calls.len(), 1);
    assert_eq!(message.tool_calls[0].id, "tc1");
    assert_eq!(message.tool_calls[0].function.name, "f");
    assert_eq!(message.tool_calls[0].function.arguments, "{\"a\":1}");
}

#[tokio::test]
async fn native_invalid_utf8_frame_does_not_end_stream() {
    let chunks = vec![
        Bytes::from_static(b"event: T\ndata: a\n\n"),
        Bytes::from_static(b"event: T\ndata: bad\xFF\n\n"),
        Bytes::from_static(b"event: T\ndata: c\n\n"),
    ];
    let message = run_with(&NativeAdapter, StreamedResponse::from_chunks(chunks)).await;
    assert_eq!(message.text(), "abad\u{FFFD}c");
}

#[tokio::test]
async fn native_text_equal_to_done_marker_is_content() {
    let text = concat!(
        "event: T\ndata: a \n\n",
        "event: T\ndata: [DONE]\n\n",
        "event: T\ndata: c\n\n",
    );
    let message = run_with(&NativeAdapter, body(text)).await;
    assert_eq!(message.text(), "a [DONE]c");
}
