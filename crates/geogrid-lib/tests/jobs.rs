//! Job orchestration against a scripted endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use geogrid_lib::{
    AnalysisEndpoint, AnalysisKind, AnalysisRequest, BuildOptions, ConnectionStrategy, Crs,
    EndpointConfig, Error, Extent, Graph, GraphBuilder, GraphInput, HttpEndpoint, JobOrchestrator,
    JobStatus, NodeSource, RemoteJobId, RemoteState, RemoteStatus,
};

/// Endpoint whose reported state advances through a script, one entry per
/// status call, sticking on the last entry.
struct ScriptedEndpoint {
    script: Vec<RemoteState>,
    polls: AtomicUsize,
    aborts: AtomicUsize,
    submissions: Mutex<Vec<AnalysisRequest>>,
}

impl ScriptedEndpoint {
    fn new(script: Vec<RemoteState>) -> Self {
        Self {
            script,
            polls: AtomicUsize::new(0),
            aborts: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }
}

impl AnalysisEndpoint for ScriptedEndpoint {
    fn submit(&self, request: &AnalysisRequest, _graph: &Graph) -> Result<RemoteJobId, Error> {
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(request.clone());
        Ok(format!("job-{}", submissions.len()))
    }

    fn status(&self, _job: &RemoteJobId) -> Result<RemoteStatus, Error> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst);
        let state = *self
            .script
            .get(n)
            .or_else(|| self.script.last())
            .expect("non-empty script");
        Ok(RemoteStatus {
            state,
            progress: progress_for(state),
            message: None,
        })
    }

    fn abort(&self, _job: &RemoteJobId) -> Result<(), Error> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn result(&self, job: &RemoteJobId) -> Result<serde_json::Value, Error> {
        Ok(serde_json::json!({ "job": job, "edges": [] }))
    }
}

fn progress_for(state: RemoteState) -> Option<u8> {
    match state {
        RemoteState::Waiting => Some(0),
        RemoteState::Running => Some(50),
        RemoteState::Success => Some(100),
        RemoteState::Failed | RemoteState::Aborted => None,
    }
}

fn sample_graph() -> Graph {
    let source = NodeSource::Random {
        count: 6,
        extent: Extent::new(0.0, 0.0, 10.0, 10.0).unwrap(),
        seed: Some(1),
    };
    let options = BuildOptions {
        connection: ConnectionStrategy::Complete,
        crs: Crs::projected("EPSG:25832"),
        ..BuildOptions::default()
    };
    GraphBuilder::new().build(&source, &options).unwrap()
}

fn request() -> AnalysisRequest {
    AnalysisRequest::new(
        "shortest path",
        AnalysisKind::ShortestPath { start: 0, end: 5 },
    )
}

#[test]
fn job_runs_through_its_lifecycle() {
    let endpoint = ScriptedEndpoint::new(vec![
        RemoteState::Waiting,
        RemoteState::Running,
        RemoteState::Success,
    ]);
    let orchestrator = JobOrchestrator::new(Box::new(endpoint));
    let id = orchestrator
        .submit(GraphInput::Graph(sample_graph()), request())
        .unwrap();

    assert_eq!(orchestrator.poll(id).unwrap(), JobStatus::Queued);
    assert_eq!(orchestrator.poll(id).unwrap(), JobStatus::Running);
    assert_eq!(orchestrator.poll(id).unwrap(), JobStatus::Completed);

    let jobs = orchestrator.jobs();
    assert_eq!(jobs[0].progress, 100);

    let result = orchestrator.result(id).unwrap();
    assert_eq!(result["job"], "job-1");
}

#[test]
fn completed_jobs_stop_polling_the_endpoint() {
    let endpoint = ScriptedEndpoint::new(vec![RemoteState::Success]);
    let orchestrator = JobOrchestrator::new(Box::new(endpoint));
    let id = orchestrator
        .submit(GraphInput::Graph(sample_graph()), request())
        .unwrap();

    assert_eq!(orchestrator.poll(id).unwrap(), JobStatus::Completed);
    // further polls are answered locally, the scripted state is irrelevant
    assert_eq!(orchestrator.poll(id).unwrap(), JobStatus::Completed);
    assert_eq!(orchestrator.poll(id).unwrap(), JobStatus::Completed);
}

#[test]
fn discard_aborts_remotely_and_sticks() {
    let endpoint = ScriptedEndpoint::new(vec![RemoteState::Running]);
    let orchestrator = JobOrchestrator::new(Box::new(endpoint));
    let id = orchestrator
        .submit(GraphInput::Graph(sample_graph()), request())
        .unwrap();

    orchestrator.discard(id).unwrap();
    assert_eq!(orchestrator.status(id).unwrap(), JobStatus::Discarded);
    assert_eq!(orchestrator.poll(id).unwrap(), JobStatus::Discarded);
    let err = orchestrator.result(id).expect_err("discarded job");
    assert!(matches!(err, Error::NotReady { .. }));
}

#[test]
fn failed_jobs_report_failed() {
    let endpoint = ScriptedEndpoint::new(vec![RemoteState::Failed]);
    let orchestrator = JobOrchestrator::new(Box::new(endpoint));
    let id = orchestrator
        .submit(GraphInput::Graph(sample_graph()), request())
        .unwrap();
    assert_eq!(orchestrator.poll(id).unwrap(), JobStatus::Failed);
}

#[test]
fn submissions_carry_the_request() {
    let endpoint = ScriptedEndpoint::new(vec![RemoteState::Waiting]);
    let orchestrator = JobOrchestrator::new(Box::new(endpoint));
    let a = orchestrator
        .submit(GraphInput::Graph(sample_graph()), request())
        .unwrap();
    let b = orchestrator
        .submit(
            GraphInput::Graph(sample_graph()),
            AnalysisRequest::new("mst", AnalysisKind::MinimumSpanningTree),
        )
        .unwrap();

    let jobs = orchestrator.jobs();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id, a);
    assert_eq!(jobs[1].id, b);
    assert_eq!(jobs[1].request.name, "mst");
}

#[test]
fn unconfigured_http_endpoint_fails_before_any_submit() {
    let err = HttpEndpoint::new(EndpointConfig::default()).expect_err("no host configured");
    assert!(matches!(err, Error::EndpointUnreachable));
}
