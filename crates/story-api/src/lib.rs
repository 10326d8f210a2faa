use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use story_core::StoryError;
use story_parser::parse_story_documents;
use story_runtime::{
    HostFunctionRegistry, StoryClock, StoryCompiler, StoryHost, StoryHostOptions, StoryLibrary,
};

pub struct CreateHostFromXmlOptions {
    pub stories_xml: BTreeMap<String, String>,
    pub entry_stories: Vec<String>,
    pub compiler: Option<StoryCompiler>,
    pub host_functions: Option<Arc<dyn HostFunctionRegistry>>,
    pub clock: Option<Rc<dyn StoryClock>>,
    pub max_steps_per_tick: Option<usize>,
}

impl CreateHostFromXmlOptions {
    pub fn new(stories_xml: BTreeMap<String, String>) -> Self {
        Self {
            stories_xml,
            entry_stories: Vec::new(),
            compiler: None,
            host_functions: None,
            clock: None,
            max_steps_per_tick: None,
        }
    }
}

#[derive(Debug)]
pub struct CompileStoriesResult {
    pub library: StoryLibrary,
    /// Recoverable load problems, each message prefixed with its file path.
    pub diagnostics: Vec<StoryError>,
}

pub struct CreatedHost {
    pub host: StoryHost,
    pub diagnostics: Vec<StoryError>,
}

pub fn compile_stories_from_xml_map(
    xml_by_path: &BTreeMap<String, String>,
) -> Result<CompileStoriesResult, StoryError> {
    compile_stories_with(&StoryCompiler::new(), xml_by_path)
}

pub fn compile_stories_with(
    compiler: &StoryCompiler,
    xml_by_path: &BTreeMap<String, String>,
) -> Result<CompileStoriesResult, StoryError> {
    let mut library = StoryLibrary::new();
    let mut diagnostics = Vec::new();

    for (path, xml) in xml_by_path {
        let documents = parse_story_documents(xml).map_err(|error| in_file(path, error))?;
        for document in documents {
            let compiled = compiler.compile(&document);
            diagnostics.extend(
                compiled
                    .diagnostics
                    .into_iter()
                    .map(|error| in_file(path, error)),
            );
            library
                .insert(compiled.template)
                .map_err(|error| in_file(path, error))?;
        }
    }

    Ok(CompileStoriesResult {
        library,
        diagnostics,
    })
}

pub fn create_host_from_xml(options: CreateHostFromXmlOptions) -> Result<CreatedHost, StoryError> {
    let compiler = options.compiler.unwrap_or_default();
    let compiled = compile_stories_with(&compiler, &options.stories_xml)?;
    let entries = resolve_entry_stories(&compiled.library, options.entry_stories)?;

    let mut host = StoryHost::new(StoryHostOptions {
        library: compiled.library,
        host_functions: options.host_functions,
        clock: options.clock,
        max_steps_per_tick: options.max_steps_per_tick,
    });
    for story_id in &entries {
        host.start_story(story_id)?;
    }

    Ok(CreatedHost {
        host,
        diagnostics: compiled.diagnostics,
    })
}

fn in_file(path: &str, error: StoryError) -> StoryError {
    StoryError {
        message: format!("{}: {}", path, error.message),
        ..error
    }
}

fn resolve_entry_stories(
    library: &StoryLibrary,
    explicit: Vec<String>,
) -> Result<Vec<String>, StoryError> {
    if explicit.is_empty() {
        if library.contains("main") {
            return Ok(vec!["main".to_string()]);
        }
        return Err(StoryError::new(
            "API_ENTRY_MAIN_NOT_FOUND",
            "Expected a story with id=\"main\" as default entry.",
        ));
    }

    for story_id in &explicit {
        if !library.contains(story_id) {
            return Err(StoryError::new(
                "API_STORY_NOT_FOUND",
                format!("Entry story \"{}\" is not registered.", story_id),
            ));
        }
    }
    Ok(explicit)
}
