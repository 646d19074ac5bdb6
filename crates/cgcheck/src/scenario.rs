//! A small harness for end-to-end scenarios: each scenario starts real
//! containers and checks their cgroups from the host.
use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Error, Result};
use libcgcheck::expectation::ResourceTable;
use libcgcheck::poll::ConvergencePoller;
use libcgcheck::process::ProcessCgroupLoader;
use libcgcheck::PathResolver;

use crate::runtime::DockerRuntime;

pub const DEFAULT_DOCKER: &str = "docker";
pub const DEFAULT_PYTHON_IMAGE: &str = "python:3-alpine";
pub const DEFAULT_ALPINE_IMAGE: &str = "alpine";

/// Everything a scenario needs from the host.
pub struct Context {
    pub docker: PathBuf,
    /// Runtime name handed to docker's `--runtime`.
    pub runtime: Option<String>,
    pub resolver: PathResolver,
    pub loader: ProcessCgroupLoader,
    pub poller: ConvergencePoller,
    pub table: ResourceTable,
    pub python_image: String,
    pub alpine_image: String,
}

impl Context {
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            docker: PathBuf::from(DEFAULT_DOCKER),
            runtime: None,
            resolver,
            loader: ProcessCgroupLoader::new(),
            poller: ConvergencePoller::default(),
            table: ResourceTable::default_docker(),
            python_image: DEFAULT_PYTHON_IMAGE.to_owned(),
            alpine_image: DEFAULT_ALPINE_IMAGE.to_owned(),
        }
    }

    /// A fresh, not yet started container.
    pub fn container(&self) -> DockerRuntime {
        DockerRuntime::new(&self.docker, self.runtime.clone())
    }
}

#[derive(Debug)]
pub enum ScenarioResult {
    Passed,
    /// The host lacks something the scenario needs.
    Skipped,
    Failed(Error),
}

impl<T> From<Result<T>> for ScenarioResult {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(_) => ScenarioResult::Passed,
            Err(err) => ScenarioResult::Failed(err),
        }
    }
}

/// Returns [`ScenarioResult::Failed`] from the enclosing function on error.
#[macro_export]
macro_rules! try_scenario {
    ($e:expr $(,)?) => {
        match $e {
            core::result::Result::Ok(val) => val,
            core::result::Result::Err(err) => {
                return $crate::scenario::ScenarioResult::Failed(err.into());
            }
        }
    };
}

pub trait Scenario {
    fn name(&self) -> &'static str;
    fn can_run(&self, _ctx: &Context) -> bool {
        true
    }
    fn run(&self, ctx: &Context) -> ScenarioResult;
}

type CheckFn = dyn Fn(&Context) -> bool;
type RunFn = dyn Fn(&Context) -> ScenarioResult;

/// A scenario that runs only if its check passes on this host.
pub struct ConditionalScenario {
    name: &'static str,
    check_fn: Box<CheckFn>,
    run_fn: Box<RunFn>,
}

impl ConditionalScenario {
    pub fn new(name: &'static str, check_fn: Box<CheckFn>, run_fn: Box<RunFn>) -> Self {
        Self {
            name,
            check_fn,
            run_fn,
        }
    }
}

impl Scenario for ConditionalScenario {
    fn name(&self) -> &'static str {
        self.name
    }

    fn can_run(&self, ctx: &Context) -> bool {
        (self.check_fn)(ctx)
    }

    fn run(&self, ctx: &Context) -> ScenarioResult {
        (self.run_fn)(ctx)
    }
}

pub struct ScenarioGroup {
    name: &'static str,
    scenarios: BTreeMap<&'static str, Box<dyn Scenario>>,
}

impl ScenarioGroup {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            scenarios: BTreeMap::new(),
        }
    }

    pub fn add<S: Scenario + 'static>(&mut self, scenario: S) {
        self.scenarios.insert(scenario.name(), Box::new(scenario));
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn scenario_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.scenarios.keys().copied()
    }

    fn run_one(ctx: &Context, scenario: &dyn Scenario) -> (&'static str, ScenarioResult) {
        let name = scenario.name();
        if !scenario.can_run(ctx) {
            tracing::info!(scenario = name, "skipping, host does not support it");
            return (name, ScenarioResult::Skipped);
        }
        tracing::debug!(scenario = name, "running");
        (name, scenario.run(ctx))
    }

    /// Scenarios start containers of their own, so they run one at a time.
    pub fn run_all(&self, ctx: &Context) -> Vec<(&'static str, ScenarioResult)> {
        self.scenarios
            .values()
            .map(|s| Self::run_one(ctx, s.as_ref()))
            .collect()
    }

    pub fn run_selected(&self, ctx: &Context, selected: &[&str]) -> Vec<(&'static str, ScenarioResult)> {
        for name in selected {
            if !self.scenarios.keys().any(|k| k == name) {
                eprintln!("Error : Scenario {}::{} not found, skipping", self.name, name);
            }
        }
        self.scenarios
            .iter()
            .filter(|(name, _)| selected.contains(name))
            .map(|(_, s)| Self::run_one(ctx, s.as_ref()))
            .collect()
    }
}

/// Counts of scenario results over a whole run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, results: &[(&'static str, ScenarioResult)]) {
        for (_, result) in results {
            match result {
                ScenarioResult::Passed => self.passed += 1,
                ScenarioResult::Skipped => self.skipped += 1,
                ScenarioResult::Failed(_) => self.failed += 1,
            }
        }
    }
}

#[derive(Default)]
pub struct ScenarioManager {
    groups: BTreeMap<&'static str, ScenarioGroup>,
}

impl ScenarioManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&mut self, group: ScenarioGroup) {
        self.groups.insert(group.name(), group);
    }

    pub fn groups(&self) -> impl Iterator<Item = &ScenarioGroup> {
        self.groups.values()
    }

    fn print_results(&self, name: &str, results: &[(&'static str, ScenarioResult)]) {
        println!("# Start group {name}");
        let len = results.len();
        for (idx, (name, result)) in results.iter().enumerate() {
            print!("{} / {} : {} : ", idx + 1, len, name);
            match result {
                ScenarioResult::Passed => println!("ok"),
                ScenarioResult::Skipped => println!("skipped"),
                ScenarioResult::Failed(e) => println!("not ok\n\t{e:#}"),
            }
        }
        println!("# End group {name}\n");
    }

    pub fn run_all(&self, ctx: &Context) -> Summary {
        let mut summary = Summary::default();
        for (name, group) in &self.groups {
            let results = group.run_all(ctx);
            self.print_results(name, &results);
            summary.record(&results);
        }
        summary
    }

    pub fn run_selected(&self, ctx: &Context, selection: &[(&str, Option<Vec<&str>>)]) -> Summary {
        let mut summary = Summary::default();
        for (group_name, scenarios) in selection {
            let Some(group) = self.groups.get(group_name) else {
                eprintln!("Error : Scenario group {group_name} not found, skipping");
                continue;
            };
            let results = match scenarios {
                None => group.run_all(ctx),
                Some(scenarios) => group.run_selected(ctx, scenarios),
            };
            self.print_results(group_name, &results);
            summary.record(&results);
        }
        summary
    }
}

/// Parses `group` or `group::a,b` selections.
pub fn parse_selection(selection: &[String]) -> Vec<(&str, Option<Vec<&str>>)> {
    selection
        .iter()
        .map(|s| match s.split_once("::") {
            Some((group, names)) => (group, Some(names.split(',').collect())),
            None => (s.as_str(), None),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    fn ctx() -> Context {
        Context::new(PathResolver::new("/nonexistent"))
    }

    fn counting(name: &'static str, runs: Rc<Cell<u32>>, can_run: bool) -> ConditionalScenario {
        ConditionalScenario::new(
            name,
            Box::new(move |_: &Context| can_run),
            Box::new(move |_: &Context| {
                runs.set(runs.get() + 1);
                ScenarioResult::Passed
            }),
        )
    }

    fn failing() -> ScenarioResult {
        try_scenario!(Err::<(), _>(anyhow::anyhow!("boom")));
        ScenarioResult::Passed
    }

    #[test]
    fn test_parse_selection() {
        let input = vec!["memory".to_owned(), "attributes::table,membership".to_owned()];
        let parsed = parse_selection(&input);
        assert_eq!(
            parsed,
            vec![
                ("memory", None),
                ("attributes", Some(vec!["table", "membership"]))
            ]
        );
    }

    #[test]
    fn test_from_result() {
        assert!(matches!(ScenarioResult::from(Ok::<_, Error>(())), ScenarioResult::Passed));
        let err: Result<()> = Err(anyhow::anyhow!("no"));
        assert!(matches!(ScenarioResult::from(err), ScenarioResult::Failed(_)));
        assert!(matches!(failing(), ScenarioResult::Failed(e) if e.to_string() == "boom"));
    }

    #[test]
    fn test_skipped_scenarios_do_not_run() {
        let runs = Rc::new(Cell::new(0));
        let mut group = ScenarioGroup::new("g");
        group.add(counting("a", runs.clone(), true));
        group.add(counting("b", runs.clone(), false));

        let results = group.run_all(&ctx());
        assert_eq!(runs.get(), 1);
        assert!(matches!(results[0], ("a", ScenarioResult::Passed)));
        assert!(matches!(results[1], ("b", ScenarioResult::Skipped)));
    }

    #[test]
    fn test_run_selected() {
        let runs = Rc::new(Cell::new(0));
        let mut group = ScenarioGroup::new("g");
        group.add(counting("a", runs.clone(), true));
        group.add(counting("b", runs.clone(), true));
        group.add(ConditionalScenario::new(
            "c",
            Box::new(|_: &Context| true),
            Box::new(|_: &Context| failing()),
        ));
        let mut manager = ScenarioManager::new();
        manager.add_group(group);

        let summary = manager.run_selected(&ctx(), &[("g", Some(vec!["b", "c", "zz"])), ("nope", None)]);
        assert_eq!(runs.get(), 1);
        assert_eq!(
            summary,
            Summary {
                passed: 1,
                skipped: 0,
                failed: 1
            }
        );
        assert!(!summary.is_success());

        let summary = manager.run_all(&ctx());
        assert_eq!(runs.get(), 3);
        assert_eq!(summary.passed, 2);
    }
}
