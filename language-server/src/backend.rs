use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::definition::Workspace;
use crate::symbols::SymbolStore;
use crate::text::DocumentStore;
use crate::{
    actions, completion, definition, folding, formatter, hierarchy, hover, lens, outline,
    references, signature,
};

#[derive(Clone)]
pub struct Backend {
    pub(crate) client: Client,
    pub(crate) symbols: Arc<SymbolStore>,
    pub(crate) documents: Arc<DocumentStore>,
    pub(crate) workspace_roots: Arc<RwLock<Vec<PathBuf>>>,
    pub(crate) config: Arc<RwLock<ServerConfig>>,
    /// Edit counter per open document; a debounced pass runs only if its
    /// generation is still the latest.
    pub(crate) generations: Arc<DashMap<String, u64>>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            symbols: Arc::new(SymbolStore::default()),
            documents: Arc::new(DocumentStore::default()),
            workspace_roots: Arc::new(RwLock::new(Vec::new())),
            config: Arc::new(RwLock::new(ServerConfig::default())),
            generations: Arc::new(DashMap::new()),
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        self.update_workspace_roots(&params);
        info!(roots = ?self.roots(), "initializing");

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "krl-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::Supported(true)),
                        ..Default::default()
                    },
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![".".to_string()]),
                    ..Default::default()
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                    retrigger_characters: None,
                    work_done_progress_options: Default::default(),
                }),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                rename_provider: Some(OneOf::Right(RenameOptions {
                    prepare_provider: Some(true),
                    work_done_progress_options: Default::default(),
                })),
                document_highlight_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                workspace_symbol_provider: Some(OneOf::Left(true)),
                code_action_provider: Some(CodeActionProviderCapability::Options(
                    CodeActionOptions {
                        code_action_kinds: Some(vec![CodeActionKind::QUICKFIX]),
                        ..Default::default()
                    },
                )),
                code_lens_provider: Some(CodeLensOptions {
                    resolve_provider: Some(false),
                }),
                document_formatting_provider: Some(OneOf::Left(true)),
                folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
                call_hierarchy_provider: Some(CallHierarchyServerCapability::Simple(true)),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                        supported: Some(true),
                        change_notifications: Some(OneOf::Left(true)),
                    }),
                    file_operations: None,
                }),
                ..Default::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.load_config().await;
        self.scan_workspace().await;
        self.client
            .log_message(
                MessageType::INFO,
                format!("KRL language server initialized ({} files indexed)", self.symbols.len()),
            )
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        info!("shutting down");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        self.analyze_document(&uri, &params.text_document.text);
        debug!(uri = %uri, "opened document");
        self.schedule_diagnostics(uri);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;

        if let Some(change) = params.content_changes.into_iter().last() {
            self.analyze_document(&uri, &change.text);
            self.schedule_diagnostics(uri);
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;

        let text = params.text.or_else(|| self.document_text(&uri));
        if let Some(text) = text {
            self.analyze_document(&uri, &text);
        }
        self.publish_diagnostics(&uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.forget_document(&uri);
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn did_change_configuration(&self, _: DidChangeConfigurationParams) {
        self.load_config().await;
        self.revalidate_open_documents().await;
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        self.change_workspace_folders(&params.event.added, &params.event.removed);
        self.scan_workspace().await;
        self.revalidate_open_documents().await;
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let Some(text) = self.document_text(&uri) else {
            return Ok(None);
        };
        let items = completion::complete(&text, position, &self.symbols.merged());
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        Ok(self
            .document_text(&uri)
            .and_then(|text| hover::hover(&text, position, &self.symbols.merged())))
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        Ok(self
            .document_text(&uri)
            .and_then(|text| signature::signature_help(&text, position, &self.symbols.merged())))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some(text) = self.document_text(&uri) else {
            return Ok(None);
        };
        let roots = self.roots();
        let merged = self.symbols.merged();
        let sources = |path: &Path| self.read_source(path);
        let workspace = Workspace {
            roots: &roots,
            merged: &merged,
            sources: &sources,
        };

        Ok(definition::definition(&text, &uri, position, &workspace)
            .map(GotoDefinitionResponse::Scalar))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let Some(name) = self
            .document_text(&uri)
            .and_then(|text| references::symbol_at(&text, position))
        else {
            return Ok(None);
        };
        let files = self.workspace_sources();
        Ok(Some(references::find_references(
            &files,
            &name,
            params.context.include_declaration,
        )))
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> Result<Option<PrepareRenameResponse>> {
        Ok(self
            .document_text(&params.text_document.uri)
            .and_then(|text| references::prepare_rename(&text, params.position))
            .map(PrepareRenameResponse::Range))
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let new_name = params.new_name;

        references::validate_new_name(&new_name).map_err(Error::invalid_params)?;

        let Some(name) = self
            .document_text(&uri)
            .and_then(|text| references::symbol_at(&text, position))
        else {
            return Ok(None);
        };
        let files = self.workspace_sources();
        let changes = references::rename_edits(&files, &name, &new_name);
        debug!(%name, %new_name, files = changes.len(), "rename");

        Ok(Some(WorkspaceEdit {
            changes: Some(changes),
            ..WorkspaceEdit::default()
        }))
    }

    async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> Result<Option<Vec<DocumentHighlight>>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        Ok(self
            .document_text(&uri)
            .map(|text| folding::highlights(&text, position)))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        Ok(self
            .document_text(&params.text_document.uri)
            .map(|text| DocumentSymbolResponse::Nested(outline::document_symbols(&text))))
    }

    async fn symbol(
        &self,
        params: WorkspaceSymbolParams,
    ) -> Result<Option<Vec<SymbolInformation>>> {
        Ok(Some(outline::workspace_symbols(
            &self.symbols.merged(),
            &params.query,
        )))
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let uri = params.text_document.uri;

        let Some(text) = self.document_text(&uri) else {
            return Ok(None);
        };
        Ok(Some(actions::quick_fixes(
            &text,
            &uri,
            &params.context.diagnostics,
        )))
    }

    async fn code_lens(&self, params: CodeLensParams) -> Result<Option<Vec<CodeLens>>> {
        let Some(text) = self.document_text(&params.text_document.uri) else {
            return Ok(None);
        };
        let files = self.workspace_sources();
        Ok(Some(lens::code_lenses(&text, &files)))
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let Some(text) = self.document_text(&params.text_document.uri) else {
            return Ok(None);
        };
        let options = self
            .config
            .read()
            .format_options(params.options.tab_size, params.options.insert_spaces);
        Ok(Some(formatter::format_edits(&text, &options)))
    }

    async fn folding_range(&self, params: FoldingRangeParams) -> Result<Option<Vec<FoldingRange>>> {
        Ok(self
            .document_text(&params.text_document.uri)
            .map(|text| folding::folding_ranges(&text)))
    }

    async fn prepare_call_hierarchy(
        &self,
        params: CallHierarchyPrepareParams,
    ) -> Result<Option<Vec<CallHierarchyItem>>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        Ok(self
            .document_text(&uri)
            .and_then(|text| hierarchy::prepare(&text, &uri, position, &self.symbols.merged()))
            .map(|item| vec![item]))
    }

    async fn incoming_calls(
        &self,
        params: CallHierarchyIncomingCallsParams,
    ) -> Result<Option<Vec<CallHierarchyIncomingCall>>> {
        let files = self.workspace_sources();
        Ok(Some(hierarchy::incoming_calls(&files, &params.item.name)))
    }

    async fn outgoing_calls(
        &self,
        params: CallHierarchyOutgoingCallsParams,
    ) -> Result<Option<Vec<CallHierarchyOutgoingCall>>> {
        let item = params.item;
        let Some(text) = self.source_text(&item.uri) else {
            return Ok(None);
        };
        Ok(Some(hierarchy::outgoing_calls(
            &text,
            &item.uri,
            &item.name,
            &self.symbols.merged(),
        )))
    }
}
