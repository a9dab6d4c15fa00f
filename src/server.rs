//! The LSP adapter: a thin shell over the [`ContextManager`] that owns the
//! open-document store, wires standard `textDocument/*` requests to the
//! context that owns each buffer, and exposes the `kconfig/*` extension
//! methods.

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_lsp::jsonrpc::{Error as RpcError, ErrorCode, Result as RpcResult};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::context::{CoreError, ContextManager, MenuDescriptor, SymbolItem};
use crate::env::{Env, EnvValue};
use crate::graph::FileSource;
use crate::{completion, definition, hover};

/// Reads an open buffer first, falling back to disk for files the client
/// hasn't opened (e.g. `source`d Kconfig fragments, unopened `.conf` files).
struct DocStoreSource<'a> {
    documents: &'a DashMap<Url, String>,
}

impl FileSource for DocStoreSource<'_> {
    fn read(&self, path: &str) -> std::io::Result<String> {
        let uri = crate::context::path_to_uri(path);
        if let Some(text) = self.documents.get(&uri) {
            return Ok(text.clone());
        }
        std::fs::read_to_string(path)
    }

    fn is_dir(&self, path: &str) -> bool {
        std::path::Path::new(path).is_dir()
    }
}

pub struct Backend {
    client: Client,
    documents: DashMap<Url, String>,
    manager: Mutex<ContextManager>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            documents: DashMap::new(),
            manager: Mutex::new(ContextManager::new()),
        }
    }

    fn source(&self) -> DocStoreSource<'_> {
        DocStoreSource { documents: &self.documents }
    }

    /// Publish diagnostics for every `.conf` file (and the command-line
    /// bucket) belonging to `ctx_id`.
    async fn publish_diagnostics_for(&self, ctx_id: u32) {
        let diags = {
            let mgr = self.manager.lock().await;
            mgr.all_diagnostics(ctx_id)
        };
        for (uri, diags) in diags {
            self.client.publish_diagnostics(uri, diags, None).await;
        }
    }

    /// A document edit: re-apply the owning context's `.conf` stack if the
    /// edited URI is one of its config files, or reparse the Kconfig tree if
    /// it's the context's root, each following a different reload path.
    async fn handle_edit(&self, uri: &Url) {
        let ctx_id = {
            let mgr = self.manager.lock().await;
            mgr.context_for_document(uri)
        };
        let Some(ctx_id) = ctx_id else { return };

        let is_root = {
            let mgr = self.manager.lock().await;
            mgr.get(ctx_id)
                .map(|ctx| &crate::context::path_to_uri(&ctx.root) == uri)
                .unwrap_or(false)
        };

        let result = {
            let mut mgr = self.manager.lock().await;
            let source = self.source();
            if is_root {
                mgr.reparse(ctx_id, &source)
            } else {
                mgr.load_config(ctx_id, &source)
            }
        };
        if let Err(e) = result {
            log::warn!("reload of context {} failed: {}", ctx_id, e);
        }
        self.publish_diagnostics_for(ctx_id).await;
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, _params: InitializeParams) -> RpcResult<InitializeResult> {
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![" ".into(), "\t".into()]),
                    ..Default::default()
                }),
                code_action_provider: Some(CodeActionProviderCapability::Simple(true)),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        log::info!("kconfig-lsp initialized");
    }

    async fn shutdown(&self) -> RpcResult<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.insert(uri.clone(), params.text_document.text);
        self.handle_edit(&uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(change) = params.content_changes.into_iter().last() {
            self.documents.insert(uri.clone(), change.text);
            self.handle_edit(&uri).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.documents.remove(&params.text_document.uri);
    }

    async fn hover(&self, params: HoverParams) -> RpcResult<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let pos = params.text_document_position_params.position;
        let Some(text) = self.documents.get(uri).map(|t| t.clone()) else {
            return Ok(None);
        };
        let mgr = self.manager.lock().await;
        let Some(ctx_id) = mgr.context_for_document(uri) else {
            return Ok(None);
        };
        let Some(ctx) = mgr.get(ctx_id) else {
            return Ok(None);
        };
        Ok(hover::hover(ctx, &text, pos))
    }

    async fn goto_definition(&self, params: GotoDefinitionParams) -> RpcResult<Option<GotoDefinitionResponse>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let pos = params.text_document_position_params.position;
        let Some(text) = self.documents.get(uri).map(|t| t.clone()) else {
            return Ok(None);
        };
        let mgr = self.manager.lock().await;
        let Some(ctx_id) = mgr.context_for_document(uri) else {
            return Ok(None);
        };
        let Some(ctx) = mgr.get(ctx_id) else {
            return Ok(None);
        };
        Ok(definition::goto_definition(ctx, &text, pos))
    }

    async fn completion(&self, params: CompletionParams) -> RpcResult<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let pos = params.text_document_position.position;
        let Some(text) = self.documents.get(uri).map(|t| t.clone()) else {
            return Ok(None);
        };
        let mgr = self.manager.lock().await;
        let Some(ctx_id) = mgr.context_for_document(uri) else {
            return Ok(None);
        };
        let Some(ctx) = mgr.get(ctx_id) else {
            return Ok(None);
        };
        Ok(completion::complete(ctx, &text, pos))
    }

    async fn code_action(&self, params: CodeActionParams) -> RpcResult<Option<CodeActionResponse>> {
        let uri = &params.text_document.uri;
        let range = params.range;
        let mgr = self.manager.lock().await;
        let Some(ctx_id) = mgr.context_for_document(uri) else {
            return Ok(None);
        };
        let actions = mgr.code_actions(ctx_id, uri, range);
        if actions.is_empty() {
            Ok(None)
        } else {
            Ok(Some(actions.into_iter().map(CodeActionOrCommand::CodeAction).collect()))
        }
    }
}

fn core_error_to_rpc(e: CoreError) -> RpcError {
    let code = match e {
        CoreError::UnknownNode(_) => 1,
        CoreError::Desync => 2,
        CoreError::ParsingFailed { .. } => 3,
    };
    RpcError {
        code: ErrorCode::ServerError(code),
        message: e.to_string().into(),
        data: None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBuildParams {
    pub root: String,
    #[serde(default)]
    pub conf: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct AddBuildResult {
    pub id: u32,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub ctx: u32,
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub ctx: u32,
    pub query: String,
    pub symbols: Vec<SymbolItem>,
}

#[derive(Debug, Deserialize)]
pub struct SetMenuParams {
    pub ctx: u32,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct SetValParams {
    pub ctx: u32,
    pub name: String,
    pub val: Option<String>,
}

impl Backend {
    /// `kconfig/addBuild`: parse a Kconfig tree and layer its `.conf`
    /// stack, publishing initial diagnostics for every file.
    pub async fn add_build(&self, params: AddBuildParams) -> RpcResult<AddBuildResult> {
        let mut env = Env::new();
        for (name, raw) in params.env {
            env.insert(name, EnvValue::from_raw(&raw));
        }
        let id = {
            let mut mgr = self.manager.lock().await;
            let source = self.source();
            mgr.add_build(params.root, params.conf, env, &source).map_err(core_error_to_rpc)?
        };
        self.publish_diagnostics_for(id).await;
        Ok(AddBuildResult { id })
    }

    /// `kconfig/search`: every symbol whose name starts with `query`
    /// (case-insensitive), with its current visibility and value.
    pub async fn search(&self, params: SearchParams) -> RpcResult<SearchResult> {
        let mgr = self.manager.lock().await;
        let symbols = mgr.symbol_search(params.ctx, &params.query);
        Ok(SearchResult {
            ctx: params.ctx,
            query: params.query,
            symbols,
        })
    }

    /// `kconfig/setMenu`: focus a menu by stable id (empty string = top)
    /// and describe its contents.
    pub async fn set_menu(&self, params: SetMenuParams) -> RpcResult<MenuDescriptor> {
        let mut mgr = self.manager.lock().await;
        mgr.touch_mru(params.ctx);
        mgr.set_menu(params.ctx, &params.id).map_err(core_error_to_rpc)
    }

    /// `kconfig/setVal`: set or unset a user value in memory, then
    /// republish diagnostics for the owning context's files.
    pub async fn set_val(&self, params: SetValParams) -> RpcResult<()> {
        {
            let mut mgr = self.manager.lock().await;
            mgr.set_val(params.ctx, &params.name, params.val).map_err(core_error_to_rpc)?;
        }
        self.publish_diagnostics_for(params.ctx).await;
        Ok(())
    }
}
