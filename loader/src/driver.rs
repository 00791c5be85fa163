// driver.rs — Multi-pass decode driver
//
// Runs decode passes over a mod's blocks until every unit is resolved or a
// pass makes no progress, then promotes whatever is still deferred to
// terminal diagnostics.
//
// Preconditions: blocks come from the parser; `sources` holds their files.
// Postconditions: every unit ends resolved (attached once) or reported in
//   the diagnostics; `LoadResult::has_errors` is the load's verdict.
// Failure modes: none at this level; problems are diagnostics.
// Side effects: logs pass progress through the `log` facade.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use log::{debug, info, trace, warn};

use crate::ast::{Block, SourceRange};
use crate::decode::{decode_block, decode_local, decode_mod_block, DecodeCtx, DecodeResult};
use crate::diag::{codes, error_count, DiagClass, Diagnostic};
use crate::eval::EvalContext;
use crate::id::{IdAllocator, ResourceId};
use crate::references::is_reference_type;
use crate::resource::{Resource, ResourceKind, ResourceMetadata};
use crate::schema::{is_valid_name, schema_for, validate_block};
use crate::source::SourceMap;
use crate::tracker::{DependencyTracker, UnitKey};
use crate::tree::{AttachError, DecodedNode, ModTree};
use crate::value::Value;

/// Mod name used when no `mod` block is present.
pub const DEFAULT_MOD_NAME: &str = "local";

// ── Options & results ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Only decode blocks of these types (`None` = all).
    pub block_types: Option<Vec<String>>,
    /// Externally supplied variable values.
    pub variables: IndexMap<String, Value>,
}

impl LoadOptions {
    fn includes(&self, block_type: &str) -> bool {
        block_type == "mod"
            || self
                .block_types
                .as_ref()
                .map_or(true, |types| types.iter().any(|t| t == block_type))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// All units resolved and no error diagnostics.
    Clean,
    Failed { errors: usize, unresolved: usize },
}

#[derive(Debug)]
pub struct LoadResult {
    pub tree: ModTree,
    pub diagnostics: Vec<Diagnostic>,
    pub passes: u32,
    /// Qualified names of units still deferred at the fixpoint.
    pub unresolved: Vec<String>,
}

impl LoadResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn status(&self) -> LoadStatus {
        let errors = error_count(&self.diagnostics);
        if errors == 0 && self.unresolved.is_empty() {
            LoadStatus::Clean
        } else {
            LoadStatus::Failed {
                errors,
                unresolved: self.unresolved.len(),
            }
        }
    }
}

/// Driver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Decoding { pass: u32 },
    Finalizing,
    Done,
}

// ── Units ──────────────────────────────────────────────────────────────────

struct Unit<'b> {
    key: UnitKey,
    block: &'b Block,
    kind: ResourceKind,
    /// Qualified name used in diagnostics.
    full_name: String,
    /// Union of references seen across every attempt.
    references: IndexSet<String>,
}

struct Driver<'b, 'o> {
    sources: &'b SourceMap,
    options: &'o LoadOptions,
    units: Vec<Unit<'b>>,
    tracker: DependencyTracker,
    env: EvalContext,
    tree: ModTree,
    diagnostics: Vec<Diagnostic>,
    declared_variables: HashSet<String>,
}

/// Decode a mod's blocks into a resource tree.
pub fn decode_mod(blocks: &[Block], sources: &SourceMap, options: &LoadOptions) -> LoadResult {
    let mod_block = blocks.iter().find(|b| b.kind() == "mod");
    let mod_name = mod_block
        .and_then(Block::short_name)
        .filter(|name| is_valid_name(name))
        .unwrap_or(DEFAULT_MOD_NAME)
        .to_string();
    let root_range = mod_block
        .map(|b| b.range)
        .unwrap_or_else(|| SourceRange::new(Default::default(), (0..0).into()));
    let mut root = Resource::root(&mod_name, root_range);
    root.metadata = Some(metadata(sources, &mod_name, root_range));

    let mut driver = Driver {
        sources,
        options,
        units: Vec::new(),
        tracker: DependencyTracker::new(),
        env: EvalContext::new(),
        tree: ModTree::new(root),
        diagnostics: Vec::new(),
        declared_variables: HashSet::new(),
    };
    info!(mod_name = mod_name.as_str(), blocks = blocks.len(); "decoding mod");
    driver.collect_units(blocks);
    driver.seed_variables();
    driver.run()
}

fn metadata(sources: &SourceMap, mod_name: &str, range: SourceRange) -> ResourceMetadata {
    let (start_line, end_line) = sources.line_range(range);
    ResourceMetadata {
        mod_short_name: mod_name.to_string(),
        file_name: sources.file_name(range.file).to_string(),
        start_line,
        end_line,
    }
}

impl<'b> Driver<'b, '_> {
    fn mod_name(&self) -> String {
        self.tree.mod_name().to_string()
    }

    // ── Unit collection ──

    fn collect_units(&mut self, blocks: &'b [Block]) {
        self.tracker.clear();
        let mut ids = IdAllocator::new();
        let mut seen_mod = false;
        let mod_name = self.mod_name();

        for block in blocks {
            let id = ids.alloc_block();
            let block_type = block.kind();
            if !self.options.includes(block_type) {
                trace!(block_type; "skipping filtered block");
                continue;
            }

            let Some(schema) = schema_for(block_type) else {
                self.diagnostics.push(
                    Diagnostic::warning(DiagClass::Validation, "Unsupported block type")
                        .with_code(codes::W0001)
                        .with_detail(format!(
                            "Blocks of type \"{block_type}\" are not recognised and will be ignored."
                        ))
                        .with_subject(block.def_range()),
                );
                continue;
            };

            if schema.kind == ResourceKind::Param {
                self.diagnostics.push(
                    Diagnostic::error(DiagClass::Validation, "Unsupported block type")
                        .with_code(codes::E0005)
                        .with_detail("Blocks of type \"param\" are only expected inside a query or control.")
                        .with_subject(block.def_range()),
                );
                continue;
            }

            if schema.kind == ResourceKind::Mod {
                if seen_mod {
                    self.diagnostics.push(
                        Diagnostic::error(DiagClass::Validation, "Duplicate mod block")
                            .with_code(codes::E0301)
                            .with_detail(format!(
                                "Only one mod block is allowed; \"{mod_name}\" is already defined."
                            ))
                            .with_subject(block.def_range()),
                    );
                    continue;
                }
                seen_mod = true;
            }

            let problems = validate_block(block, schema);
            if problems.iter().any(Diagnostic::is_error) {
                debug!(block_type, errors = problems.len(); "block failed validation");
                self.diagnostics.extend(problems);
                continue;
            }

            if schema.kind == ResourceKind::Local {
                for (i, attribute) in block.body.attributes.iter().enumerate() {
                    let key = UnitKey::member(id, i as u32);
                    let name = &attribute.name.name;
                    self.add_unit(key, block, ResourceKind::Local, name, &mod_name);
                }
                continue;
            }

            let short = block.short_name().unwrap_or_default();
            if schema.kind == ResourceKind::Variable {
                self.declared_variables.insert(short.to_string());
            }
            self.add_unit(UnitKey::block(id), block, schema.kind, short, &mod_name);
        }
        debug!(units = self.units.len(); "collected decode units");
    }

    /// Injected values of declared variables only become visible once their
    /// `variable` block decodes and converts them; the rest are usable as is.
    fn seed_variables(&mut self) {
        let undeclared: IndexMap<String, Value> = self
            .options
            .variables
            .iter()
            .filter(|(name, _)| !self.declared_variables.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        self.env = EvalContext::with_variables(&undeclared);
    }

    fn add_unit(&mut self, key: UnitKey, block: &'b Block, kind: ResourceKind, short: &str, mod_name: &str) {
        let (provides, full_name) = if kind == ResourceKind::Mod {
            ("mod".to_string(), format!("mod.{short}"))
        } else {
            let provides = format!("{}.{short}", kind.prefix());
            let full_name = format!("{mod_name}.{provides}");
            (provides, full_name)
        };
        self.tracker.register(key, provides);
        self.units.push(Unit {
            key,
            block,
            kind,
            full_name,
            references: IndexSet::new(),
        });
    }

    // ── State machine ──

    fn run(mut self) -> LoadResult {
        let mut state = if self.tracker.is_done() {
            DecodeState::Finalizing
        } else {
            DecodeState::Decoding {
                pass: self.tracker.begin_pass(),
            }
        };

        loop {
            state = match state {
                DecodeState::Decoding { pass } => {
                    self.decode_pass(pass);
                    if self.tracker.is_done() {
                        debug!(pass; "all units settled");
                        DecodeState::Finalizing
                    } else if !self.tracker.progressed() {
                        info!(pass, pending = self.tracker.pending_count(); "no progress, reached fixpoint");
                        DecodeState::Finalizing
                    } else {
                        DecodeState::Decoding {
                            pass: self.tracker.begin_pass(),
                        }
                    }
                }
                DecodeState::Finalizing => {
                    self.finalize();
                    DecodeState::Done
                }
                DecodeState::Done => break,
            };
        }

        let unresolved = self.unresolved_names();
        let result = LoadResult {
            tree: self.tree,
            diagnostics: self.diagnostics,
            passes: self.tracker.pass(),
            unresolved,
        };
        match result.status() {
            LoadStatus::Clean => {
                info!(passes = result.passes, resources = result.tree.len(); "mod loaded")
            }
            LoadStatus::Failed { errors, unresolved } => {
                warn!(passes = result.passes, errors, unresolved; "mod load failed")
            }
        }
        result
    }

    fn decode_pass(&mut self, pass: u32) {
        let order = self.tracker.next_order();
        debug!(pass, units = order.len(); "decode pass started");
        for key in order {
            if let Some(index) = self.units.iter().position(|u| u.key == key) {
                self.attempt(index);
            }
        }
        debug!(pass, pending = self.tracker.pending_count(); "decode pass finished");
    }

    fn attempt(&mut self, index: usize) {
        let mod_name = self.mod_name();
        let unit = &self.units[index];
        let (key, block, kind) = (unit.key, unit.block, unit.kind);
        let ctx = DecodeCtx {
            env: &self.env,
            mod_name: &mod_name,
            variables: &self.options.variables,
        };

        let (decoded, result) = match (kind, key.member) {
            (ResourceKind::Local, Some(member)) => {
                let Some(attribute) = block.body.attributes.get(member as usize) else {
                    return;
                };
                let (local, result) = decode_local(attribute, block, &ctx);
                (local.map(DecodedNode::leaf), result)
            }
            (ResourceKind::Mod, _) => {
                let (root, result) = decode_mod_block(block, self.tree.root(), &ctx);
                (Some(DecodedNode::leaf(root)), result)
            }
            _ => decode_block(block, &ctx),
        };

        let unit = &mut self.units[index];
        if let Some(node) = &decoded {
            unit.references.extend(node.resource.references.iter().cloned());
        }
        self.handle_result(index, decoded, result);
    }

    fn handle_result(&mut self, index: usize, decoded: Option<DecodedNode>, result: DecodeResult) {
        let key = self.units[index].key;

        if result.has_errors() {
            // A hard error wins over any deferral in the same attempt.
            debug!(unit = self.units[index].full_name.as_str(); "unit abandoned");
            self.diagnostics.extend(result.diags);
            self.tracker.abandon(key);
            return;
        }
        if let Some(dependency) = result.dependency() {
            trace!(
                unit = self.units[index].full_name.as_str(),
                needs:? = dependency.names;
                "unit deferred"
            );
            self.tracker.record_deferral(key, dependency);
            return;
        }
        // Warnings from a successful decode are kept.
        self.diagnostics.extend(result.diags);

        let Some(mut node) = decoded else {
            self.tracker.abandon(key);
            return;
        };
        let mod_name = self.mod_name();
        let sources = self.sources;
        node.for_each_mut(&mut |r| r.metadata = Some(metadata(sources, &mod_name, r.decl_range)));
        node.resource.references = self.units[index].references.clone();

        if self.units[index].kind == ResourceKind::Mod {
            let root = self.tree.root_mut();
            root.props = node.resource.props;
            root.references = node.resource.references;
            self.tracker.mark_resolved(key);
            return;
        }

        match self.tree.attach_subtree(node, ResourceId::ROOT) {
            Ok(id) => {
                self.publish(id);
                self.tracker.mark_resolved(key);
            }
            Err(err) => {
                let block = self.units[index].block;
                let (summary, class) = match &err {
                    AttachError::NameCollision { kind, name } => (
                        format!("Mod defines more than one {kind} named '{name}'"),
                        DiagClass::NameCollision,
                    ),
                    AttachError::NotAContainer { .. } => {
                        ("Invalid resource nesting".to_string(), DiagClass::Validation)
                    }
                };
                self.diagnostics.push(
                    Diagnostic::error(class, summary)
                        .with_code(codes::E0300)
                        .with_detail(err.to_string())
                        .with_subject(block.def_range()),
                );
                self.tracker.abandon(key);
            }
        }
    }

    /// Make a newly attached resource and its nested children visible to
    /// later evaluations.
    fn publish(&mut self, id: ResourceId) {
        let mod_name = self.mod_name();
        // `local.query.x` already means the local named `query`.
        let qualified = !is_reference_type(&mod_name);
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(r) = self.tree.get(id) {
                let value = r.to_value();
                if qualified {
                    self.env
                        .insert_grouped(&mod_name, r.kind.prefix(), &r.short_name, value.clone());
                }
                self.env.insert(r.kind.prefix(), &r.short_name, value);
            }
            stack.extend_from_slice(self.tree.children_of(id));
        }
    }

    // ── Finalization ──

    fn finalize(&mut self) {
        let pending: Vec<_> = self
            .tracker
            .pending()
            .map(|(key, dep)| (key, dep.clone()))
            .collect();
        for (key, dep) in pending {
            let name = self
                .units
                .iter()
                .find(|u| u.key == key)
                .map(|u| u.full_name.clone())
                .unwrap_or_default();
            self.diagnostics.push(
                Diagnostic::error(
                    DiagClass::UnresolvedAfterFixpoint,
                    format!("Failed to resolve dependencies for {name}"),
                )
                .with_code(codes::E0400)
                .with_detail(format!(
                    "unresolved references: {}; {}",
                    dep.names.join(", "),
                    dep.detail
                ))
                .with_subject(dep.range),
            );
        }

        if self.options.includes("variable") {
            for name in self.options.variables.keys() {
                if !self.declared_variables.contains(name) {
                    self.diagnostics.push(
                        Diagnostic::warning(DiagClass::Validation, "Value for undeclared variable")
                            .with_code(codes::W0002)
                            .with_detail(format!(
                                "A value was supplied for variable \"{name}\", but no variable block declares it."
                            )),
                    );
                }
            }
        }
    }

    fn unresolved_names(&self) -> Vec<String> {
        self.tracker
            .pending()
            .filter_map(|(key, _)| self.units.iter().find(|u| u.key == key))
            .map(|u| u.full_name.clone())
            .collect()
    }
}
