//! Deploy orchestrator: walks each environment's dependency graph root-first
//! and drives the resource clients to the desired state.
//!
//! Parallelism has three levels: environments deploy concurrently, weakly
//! connected components within an environment each get a worker task, and
//! the roots of one wave deploy concurrently within their component. The
//! per-environment entity map is the only shared mutable state; one mutex
//! guards it, and writes happen before the dependent node is unblocked, so
//! a dependent's resolution always sees its parents.
//!
//! Per node the lifecycle is pending → resolving → deploying → one of
//! deployed / failed / skipped. Once a node fails or skips, its transitive
//! dependents are pruned from the graph without deploying.

pub mod errors;
pub mod report;

use crate::api;
use crate::client::{bucket, platform, ClientSet, RemoteEntity};
use crate::constants;
use crate::environment::EnvironmentDefinition;
use crate::error::Error;
use crate::graph::{Component, EnvironmentGraph};
use crate::http::ClientOptions;
use crate::project::{
    ConfigKind, Configuration, Coordinate, EntityMap, Project, Properties, ResolvedEntity,
};
use crate::render;
use crate::resolve;
use crate::validate;
use errors::{ConfigDeployError, DeploymentErrors};
use report::{DeploymentReport, EnvironmentReport, NodeResult, NodeStatus, SkipCause};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Run-level deploy switches.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Press on with pruned subgraphs after a node fails, instead of
    /// aborting the component worker.
    pub continue_on_error: bool,
    /// Route all write-like calls through in-memory fakes.
    pub dry_run: bool,
    /// Transport configuration, including the ambient cancellation token.
    pub client_options: ClientOptions,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            continue_on_error: true,
            dry_run: false,
            client_options: ClientOptions::default(),
        }
    }
}

/// Deploys every project to every environment.
///
/// Environments are validated before any HTTP traffic; a validation
/// failure is fatal for its environment unless the run is a dry run (a
/// dependency cycle is fatal even then, since no deploy order exists).
pub async fn deploy(
    projects: &[Project],
    environments: &[EnvironmentDefinition],
    options: &DeployOptions,
) -> DeploymentReport {
    let mut handles = Vec::new();

    for definition in environments {
        let configurations: Vec<Configuration> = projects
            .iter()
            .flat_map(|p| p.configurations_for(&definition.name))
            .cloned()
            .collect();
        let definition = definition.clone();
        let options = options.clone();

        handles.push(tokio::spawn(async move {
            deploy_environment(definition, configurations, options).await
        }));
    }

    let mut environment_reports = Vec::new();
    let mut run_errors = DeploymentErrors::new();

    for handle in handles {
        match handle.await {
            Ok((report, environment_errors)) => {
                run_errors.extend(environment_errors);
                environment_reports.push(report);
            }
            Err(join_error) => {
                run_errors.push(ConfigDeployError::new(
                    "<unknown>",
                    None,
                    Error::deployment(format!("environment task panicked: {join_error}")),
                ));
            }
        }
    }

    DeploymentReport {
        environments: environment_reports,
        errors: run_errors,
    }
}

async fn deploy_environment(
    definition: EnvironmentDefinition,
    configurations: Vec<Configuration>,
    options: DeployOptions,
) -> (EnvironmentReport, Vec<ConfigDeployError>) {
    let environment = definition.name.clone();
    let mut results: Vec<NodeResult> = Vec::new();
    let mut environment_errors: Vec<ConfigDeployError> = Vec::new();

    info!(
        %environment,
        configurations = configurations.len(),
        dry_run = options.dry_run,
        "deploying environment"
    );

    let all_coordinates: Vec<Coordinate> = configurations
        .iter()
        .map(|c| c.coordinate.clone())
        .collect();

    let validation_errors = validate::validate_environment(&environment, &configurations);
    if !validation_errors.is_empty() {
        // A cycle leaves no deploy order, dry run or not
        let cyclic = validation_errors
            .iter()
            .any(|e| e.to_string().contains("dependency cycle"));
        let fatal = !options.dry_run || cyclic;

        for validation_error in validation_errors {
            let coordinate = validation_error.coordinate().cloned();
            environment_errors.push(ConfigDeployError::new(
                &environment,
                coordinate,
                validation_error,
            ));
        }

        if fatal {
            for coordinate in all_coordinates {
                results.push(NodeResult {
                    coordinate,
                    status: NodeStatus::Skipped {
                        cause: SkipCause::ValidationFailed,
                    },
                });
            }
            return (EnvironmentReport { environment, results }, environment_errors);
        }
        warn!(%environment, "validation failed, continuing because this is a dry run");
    }

    let graph = match EnvironmentGraph::build(&environment, configurations) {
        Ok(graph) => graph,
        Err(build_error) => {
            environment_errors.push(ConfigDeployError::new(&environment, None, build_error));
            for coordinate in all_coordinates {
                results.push(NodeResult {
                    coordinate,
                    status: NodeStatus::Skipped {
                        cause: SkipCause::ValidationFailed,
                    },
                });
            }
            return (EnvironmentReport { environment, results }, environment_errors);
        }
    };

    let clients = if options.dry_run {
        ClientSet::dry_run(&environment)
    } else {
        match ClientSet::live(&definition, &options.client_options) {
            Ok(clients) => clients,
            Err(client_error) => {
                environment_errors.push(ConfigDeployError::new(&environment, None, client_error));
                for coordinate in all_coordinates {
                    results.push(NodeResult {
                        coordinate,
                        status: NodeStatus::Skipped {
                            cause: SkipCause::Aborted,
                        },
                    });
                }
                return (EnvironmentReport { environment, results }, environment_errors);
            }
        }
    };

    let clients = Arc::new(clients);
    let entities = Arc::new(Mutex::new(EntityMap::new()));

    let mut worker_handles = Vec::new();
    for component in graph.components {
        let clients = Arc::clone(&clients);
        let entities = Arc::clone(&entities);
        let options = options.clone();
        let environment = environment.clone();
        worker_handles.push(tokio::spawn(async move {
            run_component(component, clients, entities, options, environment).await
        }));
    }

    for handle in worker_handles {
        match handle.await {
            Ok((worker_results, worker_errors)) => {
                results.extend(worker_results);
                environment_errors.extend(worker_errors);
            }
            Err(join_error) => {
                environment_errors.push(ConfigDeployError::new(
                    &environment,
                    None,
                    Error::deployment(format!("component worker panicked: {join_error}")),
                ));
            }
        }
    }

    info!(
        %environment,
        deployed = results
            .iter()
            .filter(|r| matches!(r.status, NodeStatus::Deployed { .. }))
            .count(),
        "environment deploy finished"
    );

    (EnvironmentReport { environment, results }, environment_errors)
}

/// Per-node outcome of a single deploy attempt.
enum NodeOutcome {
    Deployed(ResolvedEntity),
    Skipped(SkipCause),
    Failed(Error),
}

/// Abort reason bubbling out of the dispatch path. The `From<Error>`
/// impl lets dispatch use `?` on client calls.
enum DeployAbort {
    Skip(SkipCause),
    Fail(Error),
}

impl From<Error> for DeployAbort {
    fn from(error: Error) -> Self {
        Self::Fail(error)
    }
}

/// Drives one weakly connected component to exhaustion, wave by wave.
async fn run_component(
    mut component: Component,
    clients: Arc<ClientSet>,
    entities: Arc<Mutex<EntityMap>>,
    options: DeployOptions,
    environment: String,
) -> (Vec<NodeResult>, Vec<ConfigDeployError>) {
    let mut results: Vec<NodeResult> = Vec::new();
    let mut component_errors: Vec<ConfigDeployError> = Vec::new();
    let mut deployed_families: HashSet<String> = HashSet::new();
    let cancel = options.client_options.cancel.clone();

    loop {
        if cancel.is_cancelled() {
            skip_remaining(&mut component, &mut results, &SkipCause::Cancelled);
            break;
        }

        let roots = component.take_roots();
        if roots.is_empty() {
            if !component.is_empty() {
                component_errors.push(ConfigDeployError::new(
                    &environment,
                    None,
                    Error::deployment("graph exhausted with undeployable nodes left"),
                ));
                skip_remaining(&mut component, &mut results, &SkipCause::Aborted);
            }
            break;
        }

        // Families with a deploy wait are linearized within the component;
        // everything else in the wave deploys in parallel.
        let (sequential, parallel): (Vec<_>, Vec<_>) = roots
            .into_iter()
            .partition(|config| family_wait(config).is_some());

        let mut outcomes: Vec<(Coordinate, NodeOutcome)> = Vec::new();

        let mut handles = Vec::new();
        for config in parallel {
            let clients = Arc::clone(&clients);
            let entities = Arc::clone(&entities);
            let coordinate = config.coordinate.clone();
            handles.push((
                coordinate,
                tokio::spawn(async move { deploy_node(&config, &clients, &entities).await }),
            ));
        }

        for config in sequential {
            let family = family_of(&config);
            if let Some(wait) = family_wait(&config) {
                if deployed_families.contains(&family) {
                    debug!(%family, ?wait, "waiting between deploys of the same family");
                    if cancellable_sleep(&cancel, wait).await.is_err() {
                        outcomes.push((
                            config.coordinate.clone(),
                            NodeOutcome::Skipped(SkipCause::Cancelled),
                        ));
                        continue;
                    }
                }
            }
            let outcome = deploy_node(&config, &clients, &entities).await;
            if matches!(outcome, NodeOutcome::Deployed(_)) {
                deployed_families.insert(family);
            }
            outcomes.push((config.coordinate.clone(), outcome));
        }

        for (coordinate, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push((coordinate, outcome)),
                Err(join_error) => outcomes.push((
                    coordinate,
                    NodeOutcome::Failed(Error::deployment(format!(
                        "deploy task panicked: {join_error}"
                    ))),
                )),
            }
        }

        let mut abort = false;
        for (coordinate, outcome) in outcomes {
            match outcome {
                NodeOutcome::Deployed(entity) => {
                    let id = entity.id().unwrap_or_default().to_string();
                    entities.lock().await.insert(entity);
                    component.complete(&coordinate);
                    results.push(NodeResult {
                        coordinate,
                        status: NodeStatus::Deployed { id },
                    });
                }
                NodeOutcome::Skipped(cause) => {
                    debug!(%coordinate, %cause, "configuration skipped");
                    let pruned = component.prune(&coordinate);
                    results.push(NodeResult {
                        coordinate: coordinate.clone(),
                        status: NodeStatus::Skipped { cause },
                    });
                    skip_descendants(&coordinate, pruned, &mut results);
                }
                NodeOutcome::Failed(deploy_error) => {
                    error!(%coordinate, %deploy_error, "configuration deploy failed");
                    let pruned = component.prune(&coordinate);
                    results.push(NodeResult {
                        coordinate: coordinate.clone(),
                        status: NodeStatus::Failed,
                    });
                    component_errors.push(ConfigDeployError::new(
                        &environment,
                        Some(coordinate.clone()),
                        deploy_error,
                    ));
                    skip_descendants(&coordinate, pruned, &mut results);
                    if !options.continue_on_error {
                        abort = true;
                    }
                }
            }
        }

        if abort {
            skip_remaining(&mut component, &mut results, &SkipCause::Aborted);
            break;
        }
    }

    (results, component_errors)
}

fn skip_descendants(
    parent: &Coordinate,
    pruned: Vec<Configuration>,
    results: &mut Vec<NodeResult>,
) {
    for descendant in pruned {
        results.push(NodeResult {
            coordinate: descendant.coordinate,
            status: NodeStatus::Skipped {
                cause: SkipCause::Parent {
                    parent: parent.clone(),
                },
            },
        });
    }
}

fn skip_remaining(component: &mut Component, results: &mut Vec<NodeResult>, cause: &SkipCause) {
    for coordinate in component.remaining() {
        component.prune(&coordinate);
        results.push(NodeResult {
            coordinate,
            status: NodeStatus::Skipped {
                cause: cause.clone(),
            },
        });
    }
}

/// Resolves, renders, and dispatches one configuration.
async fn deploy_node(
    config: &Configuration,
    clients: &ClientSet,
    entities: &Mutex<EntityMap>,
) -> NodeOutcome {
    if config.skip {
        return NodeOutcome::Skipped(SkipCause::ConfigFlag);
    }

    let properties = {
        let map = entities.lock().await;
        match resolve::resolve_parameters(config, &map) {
            Ok(properties) => properties,
            Err(resolve_error) if resolve_error.is_skip() => {
                return NodeOutcome::Skipped(SkipCause::UnresolvedReference {
                    detail: resolve_error.to_string(),
                })
            }
            Err(resolve_error) => return NodeOutcome::Failed(resolve_error),
        }
    };

    match dispatch(config, clients, &properties).await {
        Ok(remote) => {
            let mut properties = properties;
            properties.insert(constants::PARAM_ID.to_string(), json!(remote.id));
            properties.insert(constants::PARAM_NAME.to_string(), json!(remote.name));
            NodeOutcome::Deployed(ResolvedEntity {
                coordinate: config.coordinate.clone(),
                name: remote.name,
                properties,
            })
        }
        Err(DeployAbort::Skip(cause)) => NodeOutcome::Skipped(cause),
        Err(DeployAbort::Fail(deploy_error)) => NodeOutcome::Failed(deploy_error),
    }
}

/// Renders the template and routes the payload to the family's client.
async fn dispatch(
    config: &Configuration,
    clients: &ClientSet,
    properties: &Properties,
) -> Result<RemoteEntity, DeployAbort> {
    let coordinate = &config.coordinate;
    let name = properties
        .get(constants::PARAM_NAME)
        .map(render::property_to_string);
    let origin = config.origin_object_id.as_deref();

    let rendered = render::render(coordinate, &config.template, properties, &HashSet::new())?;
    let payload: Value = serde_json::from_str(&rendered).map_err(|parse_error| {
        Error::client_error(
            coordinate,
            format!("rendered template is not valid JSON: {parse_error}"),
        )
    })?;

    match &config.kind {
        ConfigKind::ClassicApi { api } => {
            let spec = api::lookup(api).ok_or_else(|| {
                Error::client_error(coordinate, format!("unknown classic API family '{api}'"))
            })?;
            let name = name.ok_or_else(|| {
                Error::client_error(coordinate, "classic configurations require a 'name' parameter")
            })?;

            let derived;
            let spec = if spec.has_scope_placeholder() {
                let parent_id = properties
                    .get(constants::PARAM_SCOPE)
                    .map(render::property_to_string)
                    .filter(|id| !id.is_empty());
                let Some(parent_id) = parent_id else {
                    warn!(%coordinate, "no parent object id resolved for sub-path configuration, skipping");
                    return Err(DeployAbort::Skip(SkipCause::MissingParent));
                };
                derived = spec.apply_parent_object_id(&parent_id);
                &derived
            } else {
                spec
            };

            Ok(clients
                .classic
                .upsert(coordinate, spec, &name, &payload, origin, false)
                .await?)
        }
        ConfigKind::Settings {
            schema_id,
            schema_version,
        } => {
            let scope = properties
                .get(constants::PARAM_SCOPE)
                .map_or_else(
                    || constants::SETTINGS_DEFAULT_SCOPE.to_string(),
                    render::property_to_string,
                );
            let name = name.unwrap_or_else(|| coordinate.config_id.clone());
            Ok(clients
                .settings
                .upsert(
                    coordinate,
                    schema_id,
                    schema_version.as_deref(),
                    &scope,
                    &name,
                    origin,
                    &payload,
                )
                .await?)
        }
        ConfigKind::Bucket => {
            let bucket_name = origin.map_or_else(
                || bucket::bucket_name(&coordinate.project, &coordinate.config_id),
                str::to_string,
            );
            Ok(clients.bucket.upsert(coordinate, &bucket_name, &payload).await?)
        }
        ConfigKind::Automation { resource } => {
            let name = name.unwrap_or_else(|| coordinate.config_id.clone());
            Ok(clients
                .platform
                .upsert(coordinate, resource.endpoint(), &name, origin, &payload)
                .await?)
        }
        ConfigKind::Document { kind } => {
            let name = name.unwrap_or_else(|| coordinate.config_id.clone());
            let mut payload = payload;
            if let Some(object) = payload.as_object_mut() {
                object
                    .entry("type")
                    .or_insert_with(|| json!(kind.as_str()));
            }
            Ok(clients
                .platform
                .upsert(coordinate, platform::DOCUMENTS_PATH, &name, origin, &payload)
                .await?)
        }
        ConfigKind::OpenPipeline { kind } => {
            let path = format!(
                "{}/{}",
                platform::OPENPIPELINE_PATH,
                urlencoding::encode(kind)
            );
            let name = name.unwrap_or_else(|| kind.clone());
            Ok(clients
                .platform
                .put_singleton(coordinate, &path, kind, &name, &payload)
                .await?)
        }
        ConfigKind::Segment => {
            let name = name.unwrap_or_else(|| coordinate.config_id.clone());
            Ok(clients
                .platform
                .upsert(coordinate, platform::SEGMENTS_PATH, &name, origin, &payload)
                .await?)
        }
        ConfigKind::Slo => {
            let name = name.unwrap_or_else(|| coordinate.config_id.clone());
            Ok(clients
                .platform
                .upsert(coordinate, platform::SLO_PATH, &name, origin, &payload)
                .await?)
        }
    }
}

/// The deploy wait of a configuration's family, when the catalog carries one.
fn family_wait(config: &Configuration) -> Option<Duration> {
    match &config.kind {
        ConfigKind::ClassicApi { api } => api::lookup(api).and_then(|spec| spec.deploy_wait),
        _ => None,
    }
}

fn family_of(config: &Configuration) -> String {
    match &config.kind {
        ConfigKind::ClassicApi { api } => api.clone(),
        _ => config.coordinate.config_type.clone(),
    }
}

async fn cancellable_sleep(cancel: &CancellationToken, wait: Duration) -> Result<(), Error> {
    tokio::select! {
        () = cancel.cancelled() => Err(Error::Cancelled),
        () = tokio::time::sleep(wait) => Ok(()),
    }
}
