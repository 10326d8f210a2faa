use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;
use story_api::{create_host_from_xml, CreateHostFromXmlOptions};
use story_core::{StoryError, StoryVariant};
use story_runtime::{ManualClock, StoryClock, StoryHost};
use tracing::{debug, info};

use crate::error_map::map_cli_output;
use crate::source_loader::{read_stories_xml_from_dir, resolve_stories_dir};
use crate::RunArgs;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RunSummary {
    pub(crate) ticks: u64,
    pub(crate) elapsed_millis: i64,
    pub(crate) diagnostics: usize,
    pub(crate) stories: BTreeMap<String, BTreeMap<String, StoryVariant>>,
}

pub(crate) fn run_stories(args: RunArgs) -> Result<i32, StoryError> {
    let root = resolve_stories_dir(&args.stories_dir)?;
    let stories_xml = read_stories_xml_from_dir(&root)?;
    let messages = args
        .messages
        .iter()
        .map(|raw| parse_message(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let clock = Rc::new(ManualClock::new(0));
    let mut options = CreateHostFromXmlOptions::new(stories_xml);
    options.entry_stories = args.stories;
    options.clock = Some(clock.clone());
    let created = create_host_from_xml(options)?;
    let mut host = created.host;

    for (message_id, message_args) in messages {
        host.send_message(&message_id, message_args);
    }

    let ticks = drive(&mut host, &clock, args.ticks, args.delta);
    info!(ticks, stories = host.instances().len(), "run finished");

    let summary = RunSummary {
        ticks,
        elapsed_millis: clock.now_millis(),
        diagnostics: created.diagnostics.len(),
        stories: collect_variables(&host),
    };
    emit_summary(&summary)?;
    Ok(0)
}

/// Ticks until the budget runs out or nothing is left to run.
pub(crate) fn drive(host: &mut StoryHost, clock: &ManualClock, max_ticks: u64, delta: i64) -> u64 {
    let mut ticks = 0;
    while ticks < max_ticks && !host.is_idle() {
        clock.advance(delta);
        host.tick(delta);
        ticks += 1;
    }
    debug!(ticks, idle = host.is_idle(), "tick loop stopped");
    ticks
}

pub(crate) fn collect_variables(
    host: &StoryHost,
) -> BTreeMap<String, BTreeMap<String, StoryVariant>> {
    let mut stories = BTreeMap::new();
    for instance in host.instances() {
        stories
            .entry(instance.story_id().to_string())
            .or_insert_with(|| instance.scope().variables().clone());
    }
    stories
}

/// `"damage 5 fire"` -> `("damage", [5, "fire"])`.
pub(crate) fn parse_message(raw: &str) -> Result<(String, Vec<StoryVariant>), StoryError> {
    let mut parts = raw.split_whitespace();
    let Some(message_id) = parts.next() else {
        return Err(StoryError::new(
            "CLI_MESSAGE_INVALID",
            "--message needs a message id.",
        ));
    };
    let args = parts.map(parse_arg).collect();
    Ok((message_id.to_string(), args))
}

fn parse_arg(text: &str) -> StoryVariant {
    if let Ok(value) = text.parse::<i64>() {
        return StoryVariant::Int(value);
    }
    if let Ok(value) = text.parse::<f64>() {
        return StoryVariant::Float(value);
    }
    StoryVariant::from(text)
}

fn emit_summary(summary: &RunSummary) -> Result<(), StoryError> {
    let stories = serde_json::to_string(&summary.stories).map_err(map_cli_output)?;
    println!("RESULT:OK");
    println!("TICKS:{}", summary.ticks);
    println!("ELAPSED_MS:{}", summary.elapsed_millis);
    println!("DIAGNOSTICS:{}", summary.diagnostics);
    println!("VARS_JSON:{}", stories);
    Ok(())
}
