use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Result, bail};
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

/// Work queued for the single agent worker.
#[derive(Debug, Clone)]
pub enum Command {
    Message(String),
    Task(String),
    Reset,
}

/// Events streamed to the browser via SSE.
#[derive(Clone, Debug)]
pub enum AgentEvent {
    Thinking { iteration: usize },
    Step { number: usize, description: String },
    StepError { message: String },
    Reply { text: String },
    TaskComplete { summary: String },
    TaskError { message: String },
    Ready,
}

impl AgentEvent {
    fn name(&self) -> &'static str {
        match self {
            AgentEvent::Thinking { .. } => "thinking",
            AgentEvent::Step { .. } => "step",
            AgentEvent::StepError { .. } => "step_error",
            AgentEvent::Reply { .. } => "reply",
            AgentEvent::TaskComplete { .. } => "task_complete",
            AgentEvent::TaskError { .. } => "task_error",
            AgentEvent::Ready => "ready",
        }
    }

    fn payload(&self) -> serde_json::Value {
        match self {
            AgentEvent::Thinking { iteration } => json!({ "iteration": iteration }),
            AgentEvent::Step {
                number,
                description,
            } => json!({ "number": number, "description": description }),
            AgentEvent::StepError { message } | AgentEvent::TaskError { message } => {
                json!({ "message": message })
            }
            AgentEvent::Reply { text } => json!({ "text": text }),
            AgentEvent::TaskComplete { summary } => json!({ "summary": summary }),
            AgentEvent::Ready => json!({}),
        }
    }

    fn to_sse_event(&self) -> Event {
        Event::default()
            .event(self.name())
            .data(self.payload().to_string())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub cmd_tx: mpsc::Sender<Command>,
    pub event_tx: broadcast::Sender<AgentEvent>,
}

#[derive(Deserialize)]
struct TextPayload {
    text: String,
}

/// Bind to `addr`, or one of the next nine ports if it is taken, and serve the
/// face in the background. Returns the command queue and the event sender.
pub async fn start_server(
    addr: SocketAddr,
) -> Result<(mpsc::Receiver<Command>, broadcast::Sender<AgentEvent>)> {
    // Capacity 1: a second request waits until the worker picks up the first
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(1);
    let (event_tx, _) = broadcast::channel::<AgentEvent>(64);

    let state = Arc::new(AppState {
        cmd_tx,
        event_tx: event_tx.clone(),
    });

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/message", post(message_handler))
        .route("/task", post(task_handler))
        .route("/reset", post(reset_handler))
        .route("/events", get(sse_handler))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(state);

    let listener = bind_with_fallback(addr).await?;
    let local = listener.local_addr()?;
    tracing::info!("[Web] Face running at http://{}", local);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("[Web] Server stopped: {}", e);
        }
    });

    Ok((cmd_rx, event_tx))
}

async fn bind_with_fallback(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    for offset in 0..10u16 {
        let Some(port) = addr.port().checked_add(offset) else {
            break;
        };
        let candidate = SocketAddr::new(addr.ip(), port);
        match tokio::net::TcpListener::bind(candidate).await {
            Ok(listener) => return Ok(listener),
            Err(e) => tracing::debug!("[Web] {} unavailable: {}", candidate, e),
        }
    }
    bail!(
        "could not bind to {} or the nine ports after it. Stop the old agent first.",
        addr
    )
}

async fn index_handler() -> Html<&'static str> {
    tracing::debug!("[Web] GET /");
    Html(INDEX_HTML)
}

async fn enqueue(state: &AppState, command: Command) -> StatusCode {
    match state.cmd_tx.send(command).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn message_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TextPayload>,
) -> StatusCode {
    tracing::info!("[Web] POST /message: {}", payload.text);
    enqueue(&state, Command::Message(payload.text)).await
}

async fn task_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TextPayload>,
) -> StatusCode {
    tracing::info!("[Web] POST /task: {}", payload.text);
    if payload.text.trim().is_empty() {
        return StatusCode::BAD_REQUEST;
    }
    enqueue(&state, Command::Task(payload.text)).await
}

async fn reset_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    tracing::info!("[Web] POST /reset");
    enqueue(&state, Command::Reset).await
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream =
        BroadcastStream::new(rx).filter_map(|result: Result<AgentEvent, _>| match result {
            Ok(event) => Some(Ok::<_, Infallible>(event.to_sse_event())),
            Err(_) => None,
        });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="pt-BR">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Obelisk</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body {
    background: #0b0b10;
    color: #e4e4e7;
    font-family: system-ui, -apple-system, 'Segoe UI', sans-serif;
    height: 100vh;
    display: flex;
    flex-direction: column;
  }
  header {
    padding: 18px 28px;
    border-bottom: 1px solid #1c1c28;
    display: flex;
    align-items: center;
    gap: 10px;
  }
  header h1 { font-size: 18px; font-weight: 600; color: #fff; flex: 1; }
  .dot { width: 8px; height: 8px; border-radius: 50%; background: #22c55e; }
  .dot.busy { background: #f59e0b; }
  .main {
    flex: 1;
    display: flex;
    flex-direction: column;
    max-width: 760px;
    width: 100%;
    margin: 0 auto;
    padding: 20px 28px;
    gap: 14px;
    overflow: hidden;
  }
  #log { flex: 1; overflow-y: auto; display: flex; flex-direction: column; gap: 8px; }
  .entry { padding: 10px 14px; border-radius: 8px; font-size: 14px; line-height: 1.5; white-space: pre-wrap; }
  .entry.user { background: #1a1a2e; border-left: 3px solid #8b5cf6; }
  .entry.reply { background: #12121a; border-left: 3px solid #3b82f6; }
  .entry.step { background: #111118; border-left: 3px solid #64748b; font-family: monospace; font-size: 13px; }
  .entry.error { background: #1a0a0a; border-left: 3px solid #ef4444; color: #fca5a5; }
  .entry.done { background: #0a1a0a; border-left: 3px solid #22c55e; color: #86efac; }
  .entry.thinking { background: #111118; border-left: 3px solid #f59e0b; color: #fcd34d; }
  .input-area { display: flex; gap: 8px; }
  #text {
    flex: 1;
    background: #111118;
    border: 1px solid #26263a;
    border-radius: 8px;
    padding: 12px 14px;
    color: #fff;
    font-size: 15px;
    outline: none;
  }
  #text:focus { border-color: #8b5cf6; }
  button {
    background: #8b5cf6;
    color: #fff;
    border: none;
    border-radius: 8px;
    padding: 12px 18px;
    font-size: 14px;
    font-weight: 600;
    cursor: pointer;
  }
  button.secondary { background: #26263a; }
  button:disabled { background: #333; cursor: not-allowed; }
</style>
</head>
<body>
  <header>
    <div class="dot" id="status-dot"></div>
    <h1>Obelisk</h1>
    <button class="secondary" onclick="post('/reset')">Nova conversa</button>
  </header>
  <div class="main">
    <div id="log"></div>
    <div class="input-area">
      <input type="text" id="text" placeholder="abra o youtube, pesquise algo, leia a tela..." autofocus />
      <button id="send" onclick="send('/message')">Enviar</button>
      <button id="task" class="secondary" onclick="send('/task')">Tarefa</button>
    </div>
  </div>
<script>
  const log = document.getElementById('log');
  const text = document.getElementById('text');
  const buttons = [document.getElementById('send'), document.getElementById('task')];
  const dot = document.getElementById('status-dot');
  let busy = false;

  const esc = s => String(s).replace(/&/g, '&amp;').replace(/</g, '&lt;');

  function addEntry(cls, html) {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.innerHTML = html;
    log.appendChild(div);
    log.scrollTop = log.scrollHeight;
  }

  function setBusy(b) {
    busy = b;
    text.disabled = b;
    buttons.forEach(btn => btn.disabled = b);
    dot.className = b ? 'dot busy' : 'dot';
    if (!b) text.focus();
  }

  function post(path, body) {
    return fetch(path, {
      method: 'POST',
      headers: {'Content-Type': 'application/json'},
      body: body ? JSON.stringify(body) : '{}',
    });
  }

  async function send(path) {
    const value = text.value.trim();
    if (!value || busy) return;
    text.value = '';
    addEntry('user', (path === '/task' ? '<strong>Tarefa:</strong> ' : '<strong>Você:</strong> ') + esc(value));
    setBusy(true);
    const res = await post(path, {text: value});
    if (!res.ok) setBusy(false);
  }

  text.addEventListener('keydown', e => { if (e.key === 'Enter') send('/message'); });

  const es = new EventSource('/events');
  const on = (name, fn) => es.addEventListener(name, e => fn(JSON.parse(e.data)));

  on('thinking', d => addEntry('thinking', 'Pensando... (passo ' + d.iteration + ')'));
  on('step', d => addEntry('step', 'Passo ' + d.number + ': ' + esc(d.description)));
  on('step_error', d => addEntry('error', esc(d.message)));
  on('reply', d => addEntry('reply', esc(d.text)));
  on('task_complete', d => addEntry('done', esc(d.summary)));
  on('task_error', d => addEntry('error', esc(d.message)));
  on('ready', () => setBusy(false));

  addEntry('done', 'Obelisk pronto.');
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_match_the_page() {
        let events = [
            AgentEvent::Thinking { iteration: 1 },
            AgentEvent::Step {
                number: 1,
                description: "Clicked at (1,2)".into(),
            },
            AgentEvent::StepError {
                message: "x".into(),
            },
            AgentEvent::Reply { text: "oi".into() },
            AgentEvent::TaskComplete {
                summary: "ok".into(),
            },
            AgentEvent::TaskError {
                message: "x".into(),
            },
            AgentEvent::Ready,
        ];
        for event in events {
            assert!(
                INDEX_HTML.contains(&format!("on('{}'", event.name())),
                "page does not listen for {}",
                event.name()
            );
        }
    }

    #[test]
    fn test_payload_escapes_text() {
        let event = AgentEvent::Reply {
            text: "diz \"oi\"\n".into(),
        };
        let parsed: serde_json::Value = serde_json::from_str(&event.payload().to_string()).unwrap();
        assert_eq!(parsed["text"], "diz \"oi\"\n");
    }
}
