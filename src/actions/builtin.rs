//! Built-in action handlers: the command surface available to every agent
//! role (subject to the module gating in [`crate::agent::roles::Role`]).
//!
//! `finish` and `wait` are deliberately absent from this module — they
//! mutate [`crate::agent::state::AgentState`] directly and are handled
//! in-line by the agent runtime's iteration loop rather than dispatched
//! through the registry, since they change an agent's own status rather
//! than returning an observation for its next turn.

use super::scripts::{Script, ScriptCategory, ScriptLanguage, ScriptStore};
use super::{Action, ActionArgs, ActionContext, ActionRegistryBuilder, AgentLauncher, Sequentiality};
use crate::agent::arena::AgentArena;
use crate::agent::roles::Role;
use crate::agent::state::AgentState;
use crate::models::{Message, Severity};
use crate::notes::{NoteCategory, NotePriority, NotesStore};
use crate::progress::ProgressStore;
use crate::sandbox::dispatcher::SandboxHandle;
use crate::tracer::Tracer;
use crate::{AgentId, Result, RuntimeError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

impl FromStr for Role {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "coordinator" => Role::Coordinator,
            "reconnaissance" => Role::Reconnaissance,
            "vulnerability_tester" => Role::VulnerabilityTester,
            "validator" => Role::Validator,
            "reporter" => Role::Reporter,
            "fix_generator" => Role::FixGenerator,
            "full_access" => Role::FullAccess,
            other => {
                return Err(RuntimeError::ArgumentCoercion {
                    argument: "role".to_string(),
                    message: format!("unknown role '{other}'"),
                })
            }
        })
    }
}

fn parse_severity(s: &str) -> Result<Severity> {
    Ok(match s {
        "info" => Severity::Info,
        "low" => Severity::Low,
        "medium" => Severity::Medium,
        "high" => Severity::High,
        "critical" => Severity::Critical,
        other => {
            return Err(RuntimeError::ArgumentCoercion {
                argument: "severity".to_string(),
                message: format!("unknown severity '{other}'"),
            })
        }
    })
}

fn parse_note_category(s: &str) -> Result<NoteCategory> {
    Ok(match s {
        "general" => NoteCategory::General,
        "findings" => NoteCategory::Findings,
        "methodology" => NoteCategory::Methodology,
        "todo" => NoteCategory::Todo,
        "questions" => NoteCategory::Questions,
        "plan" => NoteCategory::Plan,
        other => {
            return Err(RuntimeError::ArgumentCoercion {
                argument: "category".to_string(),
                message: format!("unknown note category '{other}'"),
            })
        }
    })
}

fn parse_note_priority(s: &str) -> Result<NotePriority> {
    Ok(match s {
        "low" => NotePriority::Low,
        "normal" => NotePriority::Normal,
        "high" => NotePriority::High,
        "urgent" => NotePriority::Urgent,
        other => {
            return Err(RuntimeError::ArgumentCoercion {
                argument: "priority".to_string(),
                message: format!("unknown note priority '{other}'"),
            })
        }
    })
}

fn parse_script_category(s: &str) -> Result<ScriptCategory> {
    Ok(match s {
        "reconnaissance" => ScriptCategory::Reconnaissance,
        "scanning" => ScriptCategory::Scanning,
        "exploitation" => ScriptCategory::Exploitation,
        "post_exploitation" => ScriptCategory::PostExploitation,
        "reporting" => ScriptCategory::Reporting,
        "utility" => ScriptCategory::Utility,
        "validation" => ScriptCategory::Validation,
        other => {
            return Err(RuntimeError::ArgumentCoercion {
                argument: "category".to_string(),
                message: format!("unknown script category '{other}'"),
            })
        }
    })
}

fn parse_script_language(s: &str) -> Result<ScriptLanguage> {
    Ok(match s {
        "bash" => ScriptLanguage::Bash,
        "python" => ScriptLanguage::Python,
        "ruby" => ScriptLanguage::Ruby,
        "perl" => ScriptLanguage::Perl,
        "powershell" => ScriptLanguage::Powershell,
        other => {
            return Err(RuntimeError::ArgumentCoercion {
                argument: "language".to_string(),
                message: format!("unknown script language '{other}'"),
            })
        }
    })
}

fn script_to_json(script: &Script) -> Value {
    serde_json::to_value(script).expect("Script always serializes")
}

struct SpawnAgentAction {
    arena: Arc<AgentArena>,
    tracer: Arc<Tracer>,
    launcher: Arc<dyn AgentLauncher>,
}

#[async_trait]
impl Action for SpawnAgentAction {
    async fn execute(&self, ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
        let task = args.string("task")?;
        let role = Role::from_str(&args.string("role")?)?;

        let child = {
            let parent = self.arena.get(&ctx.agent_id).await?;
            let parent = parent.lock().await;
            let mut child = AgentState::child(role, task.clone(), &parent);
            child.add_message(Message::system(role.system_prompt()));
            child.add_message(Message::user(task.clone()));
            child
        };
        let child_id = child.agent_id.clone();
        self.arena.insert(child).await;
        self.tracer.log_agent_creation(child_id.clone(), role, &task, Some(ctx.agent_id.clone())).await?;
        self.launcher.launch(child_id.clone()).await;

        Ok(json!({"agent_id": child_id.to_string(), "role": role.to_string()}))
    }
}

struct SendToAgentAction {
    arena: Arc<AgentArena>,
}

#[async_trait]
impl Action for SendToAgentAction {
    async fn execute(&self, _ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
        let recipient = AgentId::from(args.string("agent_id")?);
        let message = args.string("message")?;
        self.arena.send_message(&recipient, Message::user(message)).await?;
        Ok(json!({"delivered": true}))
    }
}

struct RecordFindingAction {
    tracer: Arc<Tracer>,
}

#[async_trait]
impl Action for RecordFindingAction {
    async fn execute(&self, _ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
        let title = args.string("title")?;
        let body = args.string("body")?;
        let severity = parse_severity(&args.string("severity")?)?;
        let finding = self.tracer.add_finding(title, body, severity).await?;
        Ok(json!({"finding_id": finding.finding_id}))
    }
}

struct SaveProgressAction {
    store: Arc<ProgressStore>,
}

#[async_trait]
impl Action for SaveProgressAction {
    async fn execute(&self, _ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
        let key = args.string("key")?;
        let data = args.object("data")?;
        let append = args.boolean("append", false)?;
        let entry = self.store.save(&key, data, append).await?;
        Ok(serde_json::to_value(entry)?)
    }
}

struct LoadProgressAction {
    store: Arc<ProgressStore>,
}

#[async_trait]
impl Action for LoadProgressAction {
    async fn execute(&self, _ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
        let key = args.string("key")?;
        match self.store.load(&key).await {
            Some(entry) => Ok(serde_json::to_value(entry)?),
            None => Ok(Value::Null),
        }
    }
}

struct ListProgressAction {
    store: Arc<ProgressStore>,
}

#[async_trait]
impl Action for ListProgressAction {
    async fn execute(&self, _ctx: &ActionContext, _args: ActionArgs) -> Result<Value> {
        Ok(json!(self.store.list_keys().await))
    }
}

struct CreateNoteAction {
    store: Arc<NotesStore>,
}

#[async_trait]
impl Action for CreateNoteAction {
    async fn execute(&self, _ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
        let category = match args.string_opt("category")? {
            Some(c) => parse_note_category(&c)?,
            None => NoteCategory::General,
        };
        let priority = match args.string_opt("priority")? {
            Some(p) => parse_note_priority(&p)?,
            None => NotePriority::Normal,
        };
        let note = self
            .store
            .create(args.string("title")?, args.string("content")?, category, args.string_list("tags")?, priority)
            .await?;
        Ok(serde_json::to_value(note)?)
    }
}

struct UpdateNoteAction {
    store: Arc<NotesStore>,
}

#[async_trait]
impl Action for UpdateNoteAction {
    async fn execute(&self, _ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
        let priority = args.string_opt("priority")?.map(|p| parse_note_priority(&p)).transpose()?;
        let tags = match args.raw("tags") {
            Some(_) => Some(args.string_list("tags")?),
            None => None,
        };
        let note = self
            .store
            .update(&args.string("note_id")?, args.string_opt("title")?, args.string_opt("content")?, tags, priority)
            .await?;
        Ok(serde_json::to_value(note)?)
    }
}

struct DeleteNoteAction {
    store: Arc<NotesStore>,
}

#[async_trait]
impl Action for DeleteNoteAction {
    async fn execute(&self, _ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
        let note = self.store.delete(&args.string("note_id")?).await?;
        Ok(serde_json::to_value(note)?)
    }
}

struct ListNotesAction {
    store: Arc<NotesStore>,
}

#[async_trait]
impl Action for ListNotesAction {
    async fn execute(&self, _ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
        let category = args.string_opt("category")?.map(|c| parse_note_category(&c)).transpose()?;
        let priority = args.string_opt("priority")?.map(|p| parse_note_priority(&p)).transpose()?;
        let tags = args.string_list("tags")?;
        let tags_ref = if tags.is_empty() { None } else { Some(tags.as_slice()) };
        let search = args.string_opt("search")?;
        let notes = self.store.list(category, tags_ref, priority, search.as_deref()).await;
        Ok(json!(notes))
    }
}

struct CreateScriptAction {
    store: Arc<ScriptStore>,
}

#[async_trait]
impl Action for CreateScriptAction {
    async fn execute(&self, _ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
        let category = match args.string_opt("category")? {
            Some(c) => parse_script_category(&c)?,
            None => ScriptCategory::Utility,
        };
        let language = match args.string_opt("language")? {
            Some(l) => parse_script_language(&l)?,
            None => ScriptLanguage::Bash,
        };
        let timeout = args.integer("timeout_seconds").unwrap_or(300).max(1) as u64;
        let script = self
            .store
            .register(
                args.string("name")?,
                args.string("content")?,
                args.string("description")?,
                category,
                language,
                args.string_list("parameters")?,
                args.string_list("tags")?,
                timeout,
            )
            .await?;
        Ok(script_to_json(&script))
    }
}

struct ListScriptsAction {
    store: Arc<ScriptStore>,
}

#[async_trait]
impl Action for ListScriptsAction {
    async fn execute(&self, _ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
        let category = args.string_opt("category")?.map(|c| parse_script_category(&c)).transpose()?;
        let tags = args.string_list("tags")?;
        let tags_ref = if tags.is_empty() { None } else { Some(tags.as_slice()) };
        let scripts = self.store.list(category, tags_ref).await;
        Ok(json!(scripts.iter().map(script_to_json).collect::<Vec<_>>()))
    }
}

struct DeleteScriptAction {
    store: Arc<ScriptStore>,
}

#[async_trait]
impl Action for DeleteScriptAction {
    async fn execute(&self, _ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
        let name = args.string("name")?;
        self.store.delete(&name).await?;
        Ok(json!({"deleted": name}))
    }
}

struct ExecuteScriptAction {
    store: Arc<ScriptStore>,
    sandbox: Arc<SandboxHandle>,
}

#[async_trait]
impl Action for ExecuteScriptAction {
    async fn execute(&self, ctx: &ActionContext, args: ActionArgs) -> Result<Value> {
        let name = args.string("name")?;
        let script = self.store.get(&name).await.ok_or_else(|| RuntimeError::ArgumentCoercion {
            argument: "name".to_string(),
            message: format!("script '{name}' not found"),
        })?;

        let parameters = args.raw("parameters").cloned().unwrap_or_else(|| json!({}));
        let kwargs = json!({
            "interpreter": script.language.interpreter(),
            "content": script.content,
            "parameters": parameters,
            "timeout_seconds": script.timeout_seconds,
        });
        let response = self.sandbox.execute(&ctx.agent_id, "execute_script", kwargs).await?;
        match response.error {
            Some(error) => Err(RuntimeError::Agent(error)),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }
}

/// Shared collaborators every built-in handler needs, assembled once by the
/// runtime builder and consumed by [`register_builtin_actions`].
pub struct BuiltinCollaborators {
    pub arena: Arc<AgentArena>,
    pub tracer: Arc<Tracer>,
    pub notes: Arc<NotesStore>,
    pub progress: Arc<ProgressStore>,
    pub scripts: Arc<ScriptStore>,
    pub sandbox: Arc<SandboxHandle>,
    pub launcher: Arc<dyn AgentLauncher>,
}

pub fn register_builtin_actions(
    builder: ActionRegistryBuilder,
    collaborators: &BuiltinCollaborators,
) -> ActionRegistryBuilder {
    builder
        .register(
            "spawn_agent",
            "agents",
            false,
            Sequentiality::Sequential,
            Arc::new(SpawnAgentAction {
                arena: collaborators.arena.clone(),
                tracer: collaborators.tracer.clone(),
                launcher: collaborators.launcher.clone(),
            }),
        )
        .register(
            "send_to_agent",
            "agents",
            false,
            Sequentiality::Parallel,
            Arc::new(SendToAgentAction { arena: collaborators.arena.clone() }),
        )
        .register(
            "record_finding",
            "reporting",
            false,
            Sequentiality::Sequential,
            Arc::new(RecordFindingAction { tracer: collaborators.tracer.clone() }),
        )
        .register(
            "save_progress",
            "notes",
            false,
            Sequentiality::Parallel,
            Arc::new(SaveProgressAction { store: collaborators.progress.clone() }),
        )
        .register(
            "load_progress",
            "notes",
            false,
            Sequentiality::Parallel,
            Arc::new(LoadProgressAction { store: collaborators.progress.clone() }),
        )
        .register(
            "list_progress",
            "notes",
            false,
            Sequentiality::Parallel,
            Arc::new(ListProgressAction { store: collaborators.progress.clone() }),
        )
        .register(
            "create_note",
            "notes",
            false,
            Sequentiality::Parallel,
            Arc::new(CreateNoteAction { store: collaborators.notes.clone() }),
        )
        .register(
            "update_note",
            "notes",
            false,
            Sequentiality::Parallel,
            Arc::new(UpdateNoteAction { store: collaborators.notes.clone() }),
        )
        .register(
            "delete_note",
            "notes",
            false,
            Sequentiality::Parallel,
            Arc::new(DeleteNoteAction { store: collaborators.notes.clone() }),
        )
        .register(
            "list_notes",
            "notes",
            false,
            Sequentiality::Parallel,
            Arc::new(ListNotesAction { store: collaborators.notes.clone() }),
        )
        .register(
            "create_script",
            "python",
            false,
            Sequentiality::Sequential,
            Arc::new(CreateScriptAction { store: collaborators.scripts.clone() }),
        )
        .register(
            "list_scripts",
            "python",
            false,
            Sequentiality::Parallel,
            Arc::new(ListScriptsAction { store: collaborators.scripts.clone() }),
        )
        .register(
            "delete_script",
            "python",
            false,
            Sequentiality::Sequential,
            Arc::new(DeleteScriptAction { store: collaborators.scripts.clone() }),
        )
        .register(
            "execute_script",
            "python",
            true,
            Sequentiality::Sequential,
            Arc::new(ExecuteScriptAction { store: collaborators.scripts.clone(), sandbox: collaborators.sandbox.clone() }),
        )
}
