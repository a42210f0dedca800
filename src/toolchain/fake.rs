//! Scripted process runner (testing only)
//!
//! Rules are matched in registration order. A rule with several responses
//! hands them out one per call and then keeps repeating its last one.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use super::{Invocation, ProcessOutput, ProcessRunner};

type Matcher = Box<dyn Fn(&Invocation) -> bool + Send + Sync>;

#[derive(Clone)]
struct Response {
    result: Result<ProcessOutput, String>,
    delay: Duration,
}

struct Rule {
    matcher: Matcher,
    responses: VecDeque<Response>,
}

/// In-memory stand-in for the toolchain and compiled test executables
#[derive(Default)]
pub struct FakeProcess {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeProcess {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(self, matcher: Matcher, responses: Vec<Response>) -> Self {
        assert!(!responses.is_empty(), "a fake rule needs a response");
        self.rules.lock().unwrap().push(Rule {
            matcher,
            responses: responses.into(),
        });
        self
    }

    /// Answer matching invocations with `outputs`, in order
    pub fn on(
        self,
        matcher: impl Fn(&Invocation) -> bool + Send + Sync + 'static,
        outputs: Vec<ProcessOutput>,
    ) -> Self {
        let responses = outputs
            .into_iter()
            .map(|output| Response {
                result: Ok(output),
                delay: Duration::ZERO,
            })
            .collect();
        self.rule(Box::new(matcher), responses)
    }

    /// Answer after sleeping, to simulate a hanging process
    pub fn on_delayed(
        self,
        matcher: impl Fn(&Invocation) -> bool + Send + Sync + 'static,
        delay: Duration,
        output: ProcessOutput,
    ) -> Self {
        let response = Response {
            result: Ok(output),
            delay,
        };
        self.rule(Box::new(matcher), vec![response])
    }

    /// Fail to start matching invocations
    pub fn on_spawn_error(
        self,
        matcher: impl Fn(&Invocation) -> bool + Send + Sync + 'static,
        message: &str,
    ) -> Self {
        let response = Response {
            result: Err(message.to_string()),
            delay: Duration::ZERO,
        };
        self.rule(Box::new(matcher), vec![response])
    }

    /// Every invocation seen so far, in order
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matcher: impl Fn(&Invocation) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matcher(c)).count()
    }
}

#[async_trait]
impl ProcessRunner for FakeProcess {
    async fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        let response = {
            let mut rules = self.rules.lock().unwrap();
            let rule = rules
                .iter_mut()
                .find(|rule| (rule.matcher)(invocation))
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no fake response for {invocation}"),
                    )
                })?;
            if rule.responses.len() > 1 {
                rule.responses.pop_front()
            } else {
                rule.responses.front().cloned()
            }
        };
        let response = response.expect("fake rules always hold a response");

        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }
        response.result.map_err(io::Error::other)
    }
}

/// `go list -test ...`
pub fn go_list() -> impl Fn(&Invocation) -> bool + Send + Sync + 'static {
    |inv| inv.args.first().map(String::as_str) == Some("list")
}

/// `go test -list .` inside `dir`
pub fn go_test_list(dir: &str) -> impl Fn(&Invocation) -> bool + Send + Sync + 'static {
    let dir = PathBuf::from(dir);
    move |inv| inv.has_arg("-list") && inv.dir.as_ref() == Some(&dir)
}

/// `go test -c ...` inside `dir`
pub fn go_compile(dir: &str) -> impl Fn(&Invocation) -> bool + Send + Sync + 'static {
    let dir = PathBuf::from(dir);
    move |inv| inv.has_arg("-c") && inv.dir.as_ref() == Some(&dir)
}

/// A compiled test executable running exactly `case`
pub fn case_run(case: &str) -> impl Fn(&Invocation) -> bool + Send + Sync + 'static {
    let selector = format!("^{case}$");
    move |inv| inv.has_arg("-test.run") && inv.has_arg(&selector)
}
