//! Pipeline tests with a scripted compiler and in-process generators
//!
//! These drive `MetaGenerator` end to end without invoking cargo: the compiler double records how often
//! it is asked to build, and the generators are registered with `InProcessLoader`.

use std::cell::{Cell, RefCell};
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use microgen::build::{CompileOutput, CompileRequest, CompilerMessage, MessageLevel};
use microgen::{
    BuildError, CancellationToken, Epoch, GeneratorConfig, HostProgram, InProcessLoader, MetaGenerator,
    ModuleCompiler, PipelineError,
};
use microgen_sdk::registry::CandidateShape;
use microgen_sdk::{
    GenerationContext, GeneratorError, Guarded, MicroGenerator, SourceLocation, SourceSink, SyntaxNode,
};

const HOST: &str = r#"
use microgen_sdk::{generator_dependency, micro_generator};
use microgen_sdk::{GenerationContext, GeneratorError, MicroGenerator, SourceSink, SyntaxNode};

#[generator_dependency]
pub struct GenerateComment;

#[micro_generator]
#[derive(Default)]
pub struct CommentGenerator;

impl MicroGenerator for CommentGenerator {
    fn accept(&self, _: &GenerationContext, node: &SyntaxNode) -> bool {
        node.kind.is_type_declaration() && node.has_attribute("GenerateComment")
    }

    fn produce_source(
        &self,
        sink: &mut dyn SourceSink,
        _: &GenerationContext,
        node: &SyntaxNode,
    ) -> Result<(), GeneratorError> {
        let name = node.name.clone().unwrap_or_default();
        sink.add_source(&format!("{name}.g.rs"), format!("// Hello from {name}\n"))
    }
}

#[GenerateComment]
pub struct A;
"#;

// ============================================================================
// Test doubles
// ============================================================================

/// Compiler double: records requests and answers with a canned result.
#[derive(Default)]
struct ScriptedCompiler {
    calls: Cell<usize>,
    sources: RefCell<Vec<String>>,
    failure: Option<Vec<CompilerMessage>>,
    unavailable: bool,
}

impl ScriptedCompiler {
    fn failing(messages: Vec<CompilerMessage>) -> Self {
        Self {
            failure: Some(messages),
            ..Self::default()
        }
    }
}

impl ModuleCompiler for ScriptedCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompileOutput, BuildError> {
        self.calls.set(self.calls.get() + 1);
        self.sources.borrow_mut().push(request.lib_source.to_string());
        if self.unavailable {
            return Err(BuildError::MissingArtifact {
                crate_name: request.crate_name.to_string(),
            });
        }
        Ok(match &self.failure {
            Some(messages) => CompileOutput {
                image: None,
                messages: messages.clone(),
            },
            None => CompileOutput {
                image: Some(b"\x7fELF".to_vec()),
                messages: Vec::new(),
            },
        })
    }
}

/// Emits `<Name>.g.rs` for type declarations carrying `GenerateComment`.
#[derive(Default)]
struct CommentGenerator {
    calls: Option<Arc<AtomicUsize>>,
    explode_on: Option<&'static str>,
}

impl MicroGenerator for CommentGenerator {
    fn accept(&self, _: &GenerationContext, node: &SyntaxNode) -> bool {
        if let Some(calls) = &self.calls {
            calls.fetch_add(1, Ordering::SeqCst);
        }
        if self.explode_on.is_some() && node.name.as_deref() == self.explode_on {
            panic!("cannot look at {:?}", node.name);
        }
        node.kind.is_type_declaration() && node.has_attribute("GenerateComment")
    }

    fn produce_source(
        &self,
        sink: &mut dyn SourceSink,
        _: &GenerationContext,
        node: &SyntaxNode,
    ) -> Result<(), GeneratorError> {
        let name = node.name.clone().unwrap_or_default();
        sink.add_source(&format!("{name}.g.rs"), format!("// Hello from {name}\n"))
    }
}

/// Emits one `<Name>.names.rs` per type declaration.
#[derive(Default)]
struct NameGenerator;

impl MicroGenerator for NameGenerator {
    fn accept(&self, _: &GenerationContext, node: &SyntaxNode) -> bool {
        node.kind.is_type_declaration()
    }

    fn produce_source(
        &self,
        sink: &mut dyn SourceSink,
        _: &GenerationContext,
        node: &SyntaxNode,
    ) -> Result<(), GeneratorError> {
        let name = node.name.clone().unwrap_or_default();
        sink.add_source(&format!("{name}.names.rs"), format!("pub const NAME: &str = {name:?};\n"))
    }
}

fn counting(calls: &Arc<AtomicUsize>, explode_on: Option<&'static str>) -> InProcessLoader {
    let calls = calls.clone();
    InProcessLoader::new().register_with("CommentGenerator", move || {
        CandidateShape::Generator(Box::new(Guarded::new(CommentGenerator {
            calls: Some(calls.clone()),
            explode_on,
        })))
    })
}

fn host(source: &str) -> HostProgram {
    HostProgram::builder("host")
        .unit("src/lib.rs", source)
        .build()
        .expect("host program should parse")
}

fn generator(
    compiler: ScriptedCompiler,
    loader: InProcessLoader,
) -> MetaGenerator<ScriptedCompiler, InProcessLoader> {
    MetaGenerator::with_backends(GeneratorConfig::default().with_parallel(false), compiler, loader)
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_comment_generator_produces_one_source() {
    let loader = InProcessLoader::new().register::<CommentGenerator>("CommentGenerator");
    let mut generator = generator(ScriptedCompiler::default(), loader);

    let output = generator.run(&host(HOST), &CancellationToken::new()).unwrap();

    assert!(output.diagnostics.is_empty(), "unexpected diagnostics: {:?}", output.diagnostics);
    assert_eq!(output.sources.len(), 1);
    let source = output.source("A.g.rs").unwrap();
    assert_eq!(source.text, "// Hello from A\n");
    assert_eq!(source.generator, "CommentGenerator");
}

#[test]
fn test_module_contains_only_marked_declarations() {
    let mut generator = generator(ScriptedCompiler::default(), InProcessLoader::new());
    generator.run(&host(HOST), &CancellationToken::new()).unwrap();

    let module = generator.current_module().unwrap();
    assert_eq!(module.epoch(), Epoch(1));
    assert_eq!(module.probes(), ["GenerateComment", "CommentGenerator"]);

    let source = module.source();
    assert!(source.contains("pub struct GenerateComment;"));
    assert!(source.contains("pub struct CommentGenerator;"));
    assert!(source.contains("impl MicroGenerator for CommentGenerator"));
    assert!(source.contains("#[derive(Default)]"));
    assert!(!source.contains("#[micro_generator]"));
    assert!(!source.contains("#[generator_dependency]"));
    assert!(!source.contains("pub struct A;"));
    syn::parse_file(source).expect("assembled module should parse");
}

// ============================================================================
// Memoisation
// ============================================================================

#[test]
fn test_whitespace_change_does_not_rebuild_or_reload() {
    let loader = InProcessLoader::new().register::<CommentGenerator>("CommentGenerator");
    let mut generator = generator(ScriptedCompiler::default(), loader);
    let token = CancellationToken::new();

    let first = generator.run(&host(HOST), &token).unwrap();
    let reformatted = HOST.replace("    ", "\t").replace("\n\n", "\n\n// reformatted\n\n");
    let second = generator.run(&host(&reformatted), &token).unwrap();

    assert_eq!(first.sources, second.sources);
    assert_eq!(generator.compiler().calls.get(), 1);
    let stats = generator.stats();
    assert_eq!(stats.module.misses, 1);
    assert_eq!(stats.module.hits, 1);
    assert_eq!(stats.load.misses, 1);
    assert_eq!(stats.load.hits, 1);
    assert_eq!(stats.dispatch.misses, 2);
}

#[test]
fn test_identical_pass_replays_output() {
    let loader = InProcessLoader::new().register::<CommentGenerator>("CommentGenerator");
    let mut generator = generator(ScriptedCompiler::default(), loader);
    let token = CancellationToken::new();

    let first = generator.run(&host(HOST), &token).unwrap();
    let second = generator.run(&host(HOST), &token).unwrap();

    assert_eq!(first, second);
    assert_eq!(generator.stats().dispatch.hits, 1);
}

#[test]
fn test_line_shift_refreshes_diagnostic_locations() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut generator = generator(ScriptedCompiler::default(), counting(&calls, Some("A")));
    let token = CancellationToken::new();

    let first = generator.run(&host(HOST), &token).unwrap();
    let shifted = format!("\n\n\n\n\n{HOST}");
    let second = generator.run(&host(&shifted), &token).unwrap();

    let line = |output: &microgen::GenerationOutput| {
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].id, "MSG002");
        output.diagnostics[0].location.as_ref().unwrap().line
    };
    assert_eq!(line(&second), line(&first) + 5);
    assert_eq!(generator.compiler().calls.get(), 1);
    assert_eq!(generator.stats().load.hits, 1);
    assert_eq!(generator.stats().dispatch.hits, 0);
}

#[test]
fn test_unrelated_change_reuses_module_but_redispatches() {
    let loader = InProcessLoader::new().register::<CommentGenerator>("CommentGenerator");
    let mut generator = generator(ScriptedCompiler::default(), loader);
    let token = CancellationToken::new();

    generator.run(&host(HOST), &token).unwrap();
    let extended = format!("{HOST}\n#[GenerateComment]\npub struct B;\n");
    let output = generator.run(&host(&extended), &token).unwrap();

    assert_eq!(generator.compiler().calls.get(), 1);
    assert_eq!(generator.current_module().unwrap().epoch(), Epoch(1));
    assert_eq!(generator.stats().dispatch.misses, 2);
    assert!(output.source("A.g.rs").is_some());
    assert!(output.source("B.g.rs").is_some());
}

#[test]
fn test_generator_change_rebuilds_with_new_epoch() {
    let mut generator = generator(ScriptedCompiler::default(), InProcessLoader::new());
    let token = CancellationToken::new();

    generator.run(&host(HOST), &token).unwrap();
    let changed = HOST.replace("pub struct CommentGenerator;", "pub struct CommentGenerator { seen: u32 }");
    generator.run(&host(&changed), &token).unwrap();

    assert_eq!(generator.compiler().calls.get(), 2);
    assert_eq!(generator.current_module().unwrap().epoch(), Epoch(2));
    assert_eq!(generator.stats().load.misses, 2);
    assert!(generator.compiler().sources.borrow()[1].contains("seen: u32"));
}

#[test]
fn test_generators_are_instantiated_once_per_pass() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();
    let loader = InProcessLoader::new().register_with("CommentGenerator", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        CandidateShape::Generator(Box::new(Guarded::new(CommentGenerator::default())))
    });
    let mut generator = generator(ScriptedCompiler::default(), loader);
    let token = CancellationToken::new();

    generator.run(&host(HOST), &token).unwrap();
    generator
        .run(&host(&format!("{HOST}\npub struct C;")), &token)
        .unwrap();

    assert_eq!(constructed.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Faults
// ============================================================================

#[test]
fn test_missing_marker_crate_is_a_configuration_fault() {
    let program = HostProgram::builder("host")
        .without_markers()
        .unit("src/lib.rs", HOST)
        .build()
        .unwrap();
    let mut generator = generator(ScriptedCompiler::default(), InProcessLoader::new());

    let err = generator.run(&program, &CancellationToken::new()).unwrap_err();

    assert!(matches!(err, PipelineError::MarkerUnresolved { .. }));
    assert_eq!(generator.compiler().calls.get(), 0);
}

#[test]
fn test_compile_failure_loads_nothing_and_forwards_messages() {
    let calls = Arc::new(AtomicUsize::new(0));
    let compiler = ScriptedCompiler::failing(vec![CompilerMessage {
        code: Some("E0412".to_string()),
        level: MessageLevel::Error,
        message: "cannot find type `Missing` in this scope".to_string(),
        rendered: None,
        location: Some(SourceLocation::new("src/lib.rs", 12, 20)),
    }]);
    let mut generator = generator(compiler, counting(&calls, None));

    let output = generator.run(&host(HOST), &CancellationToken::new()).unwrap();

    assert!(output.sources.is_empty());
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].id, "E0412");
    assert!(output.has_errors());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!generator.current_module().unwrap().is_loadable());
}

#[test]
fn test_unavailable_compiler_becomes_build_diagnostic() {
    let compiler = ScriptedCompiler {
        unavailable: true,
        ..ScriptedCompiler::default()
    };
    let mut generator = generator(compiler, InProcessLoader::new().register::<CommentGenerator>("C"));

    let output = generator.run(&host(HOST), &CancellationToken::new()).unwrap();

    assert!(output.sources.is_empty());
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].id, "MSG006");
}

#[test]
fn test_filter_fault_affects_only_its_unit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = counting(&calls, Some("A")).register::<NameGenerator>("NameGenerator");
    let mut generator = generator(ScriptedCompiler::default(), loader);

    let output = generator.run(&host(HOST), &CancellationToken::new()).unwrap();

    assert_eq!(output.diagnostics.len(), 1);
    let diagnostic = &output.diagnostics[0];
    assert_eq!(diagnostic.id, "MSG002");
    assert!(diagnostic.message.contains("'CommentGenerator'"));
    assert!(diagnostic.message.contains("panic"));
    assert_eq!(diagnostic.location.as_ref().unwrap().file, "src/lib.rs");

    assert!(output.source("A.g.rs").is_none());
    assert!(calls.load(Ordering::SeqCst) > 1);
    for name in ["GenerateComment", "CommentGenerator", "A"] {
        assert!(output.source(&format!("{name}.names.rs")).is_some(), "missing {name}.names.rs");
    }
}

#[test]
fn test_wrong_shapes_are_never_instantiated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = counting(&calls, None)
        .register_with("Data", || CandidateShape::NotAGenerator)
        .register_with("NoDefault", || CandidateShape::MissingConstructor);
    let mut generator = generator(ScriptedCompiler::default(), loader);

    let output = generator.run(&host(HOST), &CancellationToken::new()).unwrap();

    let ids: Vec<_> = output.diagnostics.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["MSG004"]);
    assert!(output.diagnostics[0].message.contains("'NoDefault'"));
    assert_eq!(output.sources.len(), 1);
}

#[test]
fn test_cancelled_pass_returns_error() {
    let mut generator = generator(ScriptedCompiler::default(), InProcessLoader::new());
    let token = CancellationToken::new();
    token.cancel();

    let err = generator.run(&host(HOST), &token).unwrap_err();

    assert!(matches!(err, PipelineError::Cancelled));
    assert!(generator.current_module().is_none());
}

// ============================================================================
// Host crates on disk
// ============================================================================

#[test]
fn test_generate_crate_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("my-host");
    fs::create_dir_all(root.join("src/plugins")).unwrap();
    fs::write(root.join("src/lib.rs"), "pub mod plugins;\n#[GenerateComment]\npub struct A;\n").unwrap();
    fs::write(
        root.join("src/plugins/mod.rs"),
        "use microgen_sdk::micro_generator;\n#[micro_generator]\n#[derive(Default)]\npub struct CommentGenerator;\n",
    )
    .unwrap();

    let loader = InProcessLoader::new().register::<CommentGenerator>("plugins::CommentGenerator");
    let mut generator = generator(ScriptedCompiler::default(), loader);
    let output = generator.generate_crate(&root, &CancellationToken::new()).unwrap();

    assert_eq!(output.sources.len(), 1);
    assert_eq!(output.source("A.g.rs").unwrap().generator, "plugins::CommentGenerator");
    let module = generator.current_module().unwrap();
    assert_eq!(module.probes(), ["plugins::CommentGenerator"]);
    assert!(module.source().contains("pub mod plugins {"));
}

#[test]
fn test_generate_crate_from_disk_ignores_binary_targets() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("my-host");
    fs::create_dir_all(root.join("src/bin")).unwrap();
    fs::write(
        root.join("src/lib.rs"),
        "use microgen_sdk::micro_generator;\n#[micro_generator]\n#[derive(Default)]\npub struct CommentGenerator;\n#[GenerateComment]\npub struct A;\n",
    )
    .unwrap();
    let binary = "use microgen_sdk::micro_generator;\nuse my_host::A;\n#[micro_generator]\n#[derive(Default)]\npub struct CliGenerator;\nfn main() {}\n";
    fs::write(root.join("src/main.rs"), binary).unwrap();
    fs::write(root.join("src/bin/tool.rs"), binary).unwrap();

    let loader = InProcessLoader::new().register::<CommentGenerator>("CommentGenerator");
    let mut generator = generator(ScriptedCompiler::default(), loader);
    let output = generator.generate_crate(&root, &CancellationToken::new()).unwrap();

    assert!(output.diagnostics.is_empty(), "unexpected diagnostics: {:?}", output.diagnostics);
    assert_eq!(output.sources.len(), 1);
    assert!(output.source("A.g.rs").is_some());
    let module = generator.current_module().unwrap();
    assert_eq!(module.probes(), ["CommentGenerator"]);
    assert!(!module.source().contains("CliGenerator"));
    assert!(!module.source().contains("pub mod bin"));
}
