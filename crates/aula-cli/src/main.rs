use std::collections::VecDeque;
use std::env;
use std::fs;
use std::io;
use std::io::Write;
use std::path::PathBuf;

use serde::Deserialize;

use aula_client::api::HttpApi;
use aula_client::executor::EffectExecutor;
use aula_core::actions::RuntimeAction;
use aula_core::actions::SessionAction;
use aula_core::actions::UserAction;
use aula_core::catalog::SubjectCatalog;
use aula_core::identity::LaunchParams;
use aula_core::ledger::Role;
use aula_core::persistence::FileStore;
use aula_core::persistence::KeyValueStore;
use aula_core::persistence::SessionStore;
use aula_core::reducer::reduce;
use aula_core::reducer::Effect;
use aula_core::state::ChatMode;
use aula_core::state::IdentityPhase;
use aula_core::state::SessionState;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct AppConfig {
    base_url: String,
    store_path: Option<PathBuf>,
    catalog_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            store_path: None,
            catalog_path: None,
        }
    }
}

#[derive(Debug, Default)]
struct CliArgs {
    base_url: Option<String>,
    store_path: Option<PathBuf>,
    catalog_path: Option<PathBuf>,
    launch_query: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = match parse_args(env::args().skip(1).collect())? {
        Some(args) => args,
        None => return Ok(()),
    };

    let config = load_config();
    let base_url = args.base_url.unwrap_or(config.base_url);
    let store_path = args
        .store_path
        .or(config.store_path)
        .unwrap_or_else(default_store_path);
    let catalog = load_catalog(args.catalog_path.or(config.catalog_path));

    let api = HttpApi::new(&base_url)?;
    let store = SessionStore::new(FileStore::open(&store_path)?);
    let mut executor = EffectExecutor::new(api, store);

    let (persisted, storage_errors) = executor.store().load_session();
    let launch = args
        .launch_query
        .map(|query| LaunchParams::from_query(&query))
        .unwrap_or_default();

    let mut state = SessionState::new(catalog);
    dispatch(
        &mut state,
        &mut executor,
        SessionAction::Runtime(RuntimeAction::Hydrate { launch, persisted }),
    )
    .await;
    for error in storage_errors {
        dispatch(
            &mut state,
            &mut executor,
            SessionAction::Runtime(RuntimeAction::StorageDegraded {
                context: "hydrate".to_string(),
                message: error.to_string(),
            }),
        )
        .await;
    }

    if terminal_rejection(&state) {
        return Ok(());
    }

    print_welcome(&state);
    repl(&mut state, &mut executor).await
}

fn parse_args(args: Vec<String>) -> Result<Option<CliArgs>, Box<dyn std::error::Error>> {
    let mut parsed = CliArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--version" | "-V" => {
                println!("aula {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "--base-url" => {
                parsed.base_url = Some(required_value(&args, i, "--base-url")?);
                i += 2;
            }
            "--store" => {
                parsed.store_path = Some(PathBuf::from(required_value(&args, i, "--store")?));
                i += 2;
            }
            "--catalog" => {
                parsed.catalog_path = Some(PathBuf::from(required_value(&args, i, "--catalog")?));
                i += 2;
            }
            "--launch-query" => {
                parsed.launch_query = Some(required_value(&args, i, "--launch-query")?);
                i += 2;
            }
            other => {
                return Err(format!("unsupported argument: {other}").into());
            }
        }
    }
    Ok(Some(parsed))
}

fn required_value(
    args: &[String],
    index: usize,
    flag: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    args.get(index + 1)
        .cloned()
        .ok_or_else(|| format!("{flag} requires a value").into())
}

fn load_config() -> AppConfig {
    let Some(path) = dirs::config_dir().map(|dir| dir.join("aula").join("config.toml")) else {
        return AppConfig::default();
    };
    let Ok(raw) = fs::read_to_string(&path) else {
        return AppConfig::default();
    };
    match toml::from_str(&raw) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring invalid config");
            AppConfig::default()
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("aula")
        .join("session.json")
}

fn load_catalog(path: Option<PathBuf>) -> SubjectCatalog {
    let Some(path) = path else {
        return SubjectCatalog::builtin();
    };
    match fs::read_to_string(&path).map_err(|err| err.to_string()).and_then(|raw| {
        SubjectCatalog::from_yaml(&raw).map_err(|err| err.to_string())
    }) {
        Ok(catalog) => catalog,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "falling back to built-in catalog");
            SubjectCatalog::builtin()
        }
    }
}

/// Runs one action plus every effect it fans out into, feeding results back
/// until the queue drains.
async fn dispatch<S: KeyValueStore>(
    state: &mut SessionState,
    executor: &mut EffectExecutor<HttpApi, S>,
    action: SessionAction,
) {
    let mut pending: VecDeque<Effect> = reduce(state, action).into();
    while let Some(effect) = pending.pop_front() {
        if effect == Effect::RequestRedraw {
            continue;
        }
        for action in executor.execute(effect).await {
            pending.extend(reduce(state, SessionAction::Runtime(action)));
        }
    }
}

fn terminal_rejection(state: &SessionState) -> bool {
    if state.identity.phase != IdentityPhase::Rejected {
        return false;
    }
    println!("La sesión no pudo validarse.");
    if let Some(rejection) = &state.identity.rejection {
        println!("  {rejection}");
    }
    println!("Vuelve a acceder desde la plataforma de tu curso.");
    true
}

fn print_welcome(state: &SessionState) {
    println!("aula {} | escribe /help para ver los comandos", env!("CARGO_PKG_VERSION"));
    if let Some(token) = &state.identity.token {
        if let Some(label) = &token.context_label {
            println!("Contexto: {label}");
        }
    }
    print_status(state);
}

fn print_status(state: &SessionState) {
    let subject = if state.directory.has_selection() {
        state
            .catalog
            .get(&state.directory.selected)
            .map(|subject| subject.name.clone())
            .unwrap_or_else(|| state.directory.selected.clone())
    } else {
        "(ninguna)".to_string()
    };
    let email = if state.identity.email.is_empty() {
        "(sin email)".to_string()
    } else {
        state.identity.email.clone()
    };
    println!(
        "[{} | {} | asignatura: {} | modo: {}]",
        state.identity.phase.label(),
        email,
        subject,
        state.chat_mode.label()
    );
}

fn print_inline_error(state: &SessionState) {
    if let Some(error) = &state.error {
        println!("! {}", error.message);
    }
}

fn print_last_reply(state: &SessionState) {
    let Some(thread) = state.current_thread() else {
        return;
    };
    let Some(message) = thread.messages.last() else {
        return;
    };
    if message.role != Role::Assistant {
        return;
    }
    println!("asistente: {}", message.content);
    if !message.sources.is_empty() {
        println!("  fuentes: {}", message.sources.join(", "));
    }
    if let Some(model) = &message.model_used {
        println!("  modelo: {model}");
    }
}

fn print_subjects(state: &SessionState) {
    if state.directory.subjects.is_empty() {
        println!("Sin asignaturas suscritas.");
    } else {
        for id in &state.directory.subjects {
            let marker = if *id == state.directory.selected { "*" } else { " " };
            let name = state
                .catalog
                .get(id)
                .map(|subject| subject.name.as_str())
                .unwrap_or(id.as_str());
            println!(" {marker} {id} — {name}");
        }
    }
    println!("Catálogo disponible:");
    for subject in &state.catalog.subjects {
        println!("   {} {} — {}", subject.icon, subject.id, subject.name);
    }
}

fn print_thread(state: &SessionState) {
    let Some(thread) = state.current_thread() else {
        println!("Sin conversación activa: selecciona una asignatura con /select.");
        return;
    };
    if thread.messages.is_empty() {
        println!("Conversación vacía.");
        return;
    }
    for message in &thread.messages {
        let who = match message.role {
            Role::User => "tú",
            Role::Assistant => "asistente",
        };
        println!("{who}: {}", message.content);
    }
}

fn print_logs(state: &SessionState) {
    for entry in state.logs.iter() {
        println!(
            "[{}] {} {}: {}",
            entry.level.label(),
            entry.source.label(),
            entry.context.as_deref().unwrap_or("-"),
            entry.message
        );
    }
}

fn print_help() {
    println!("aula {}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  aula [--base-url URL] [--store PATH] [--catalog PATH] [--launch-query QUERY]");
    println!();
    println!("Commands inside the session:");
    println!("  /email <dirección>   set the standalone email");
    println!("  /subjects            list subscribed subjects and the catalog");
    println!("  /add <id>            subscribe to a subject");
    println!("  /remove <id>         unsubscribe from a subject");
    println!("  /select <id>         switch the active subject");
    println!("  /mode <rag|base|rag_lora>  change the chat mode");
    println!("  /thread              show the active conversation");
    println!("  /logs                show the session log");
    println!("  /status              show identity and selection");
    println!("  /quit                exit");
    println!("  anything else is sent as a question");
}

async fn repl<S: KeyValueStore>(
    state: &mut SessionState,
    executor: &mut EffectExecutor<HttpApi, S>,
) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let (name, argument) = match command.split_once(char::is_whitespace) {
                Some((name, rest)) => (name, rest.trim()),
                None => (command, ""),
            };
            match name {
                "quit" | "exit" => return Ok(()),
                "help" => print_help(),
                "status" => print_status(state),
                "subjects" => print_subjects(state),
                "thread" => print_thread(state),
                "logs" => print_logs(state),
                "email" => {
                    dispatch(
                        state,
                        executor,
                        SessionAction::User(UserAction::SetEmail(argument.to_string())),
                    )
                    .await;
                    print_inline_error(state);
                    print_status(state);
                }
                "select" => {
                    dispatch(
                        state,
                        executor,
                        SessionAction::User(UserAction::SelectSubject(argument.to_string())),
                    )
                    .await;
                    print_status(state);
                }
                "add" => {
                    dispatch(
                        state,
                        executor,
                        SessionAction::User(UserAction::AddSubject(argument.to_string())),
                    )
                    .await;
                    print_inline_error(state);
                    print_subjects(state);
                }
                "remove" => {
                    dispatch(
                        state,
                        executor,
                        SessionAction::User(UserAction::RemoveSubject(argument.to_string())),
                    )
                    .await;
                    print_inline_error(state);
                    print_subjects(state);
                }
                "mode" => match ChatMode::parse(argument) {
                    Some(mode) => {
                        dispatch(
                            state,
                            executor,
                            SessionAction::User(UserAction::SetChatMode(mode)),
                        )
                        .await;
                        print_status(state);
                    }
                    None => println!("Modo desconocido: {argument}"),
                },
                other => println!("Comando desconocido: /{other}"),
            }
            continue;
        }

        dispatch(
            state,
            executor,
            SessionAction::User(UserAction::SubmitMessage(line.to_string())),
        )
        .await;
        print_inline_error(state);
        print_last_reply(state);
    }
}
