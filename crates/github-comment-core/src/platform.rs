//! CI platform detection and option complement.
//!
//! When flags leave org/repo/PR/SHA1 unset, the detected platform fills them
//! from its well-known environment variables. Detection is best-effort: an
//! unrecognized environment simply yields `None` and the caller relies on
//! explicit flags and config defaults.

/// The subset of options every subcommand shares and a platform can fill in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetRef {
    pub org: String,
    pub repo: String,
    pub pr_number: u64,
    pub sha1: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    CircleCi,
    GithubActions,
    Drone,
    CodeBuild,
}

/// Read an environment variable, treating absence as empty. This is the
/// shape the platform tables want and tests can fake with a closure.
pub fn getenv_os(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

impl Platform {
    pub fn detect(getenv: &impl Fn(&str) -> String) -> Option<Platform> {
        if !getenv("CIRCLECI").is_empty() {
            return Some(Platform::CircleCi);
        }
        if !getenv("GITHUB_ACTIONS").is_empty() {
            return Some(Platform::GithubActions);
        }
        if !getenv("DRONE").is_empty() {
            return Some(Platform::Drone);
        }
        if !getenv("CODEBUILD_BUILD_ID").is_empty() {
            return Some(Platform::CodeBuild);
        }
        None
    }

    /// Stable identifier used for metadata enrichment.
    pub fn id(self) -> &'static str {
        match self {
            Platform::CircleCi => "circleci",
            Platform::GithubActions => "github-actions",
            Platform::Drone => "drone",
            Platform::CodeBuild => "codebuild",
        }
    }

    /// Fill the unset fields of `target` from the platform environment.
    pub fn complement(self, target: &mut TargetRef, getenv: &impl Fn(&str) -> String) {
        match self {
            Platform::CircleCi => {
                fill(&mut target.org, getenv("CIRCLE_PROJECT_USERNAME"));
                fill(&mut target.repo, getenv("CIRCLE_PROJECT_REPONAME"));
                fill(&mut target.sha1, getenv("CIRCLE_SHA1"));
                if target.pr_number == 0 {
                    // CIRCLE_PULL_REQUEST is the PR URL; the number is its
                    // last path segment.
                    let pr_url = getenv("CIRCLE_PULL_REQUEST");
                    if let Some(number) = pr_url.rsplit('/').next() {
                        target.pr_number = number.parse().unwrap_or(0);
                    }
                }
            }
            Platform::GithubActions => {
                let repository = getenv("GITHUB_REPOSITORY");
                if let Some((org, repo)) = repository.split_once('/') {
                    fill(&mut target.org, org.to_string());
                    fill(&mut target.repo, repo.to_string());
                }
                fill(&mut target.sha1, getenv("GITHUB_SHA"));
                if target.pr_number == 0 {
                    target.pr_number = pr_number_from_github_ref(&getenv("GITHUB_REF"));
                }
            }
            Platform::Drone => {
                fill(&mut target.org, getenv("DRONE_REPO_OWNER"));
                fill(&mut target.repo, getenv("DRONE_REPO_NAME"));
                fill(&mut target.sha1, getenv("DRONE_COMMIT_SHA"));
                if target.pr_number == 0 {
                    target.pr_number = getenv("DRONE_PULL_REQUEST").parse().unwrap_or(0);
                }
            }
            Platform::CodeBuild => {
                let repo_url = getenv("CODEBUILD_SOURCE_REPO_URL");
                if let Some((org, repo)) = repo_from_source_url(&repo_url) {
                    fill(&mut target.org, org);
                    fill(&mut target.repo, repo);
                }
                fill(&mut target.sha1, getenv("CODEBUILD_RESOLVED_SOURCE_VERSION"));
                if target.pr_number == 0 {
                    let source_version = getenv("CODEBUILD_SOURCE_VERSION");
                    if let Some(number) = source_version.strip_prefix("pr/") {
                        target.pr_number = number.parse().unwrap_or(0);
                    }
                }
            }
        }
        if target.pr_number == 0 {
            target.pr_number = getenv("CI_INFO_PR_NUMBER").parse().unwrap_or(0);
        }
    }

    /// Markdown build link rendered by the built-in `link` template.
    pub fn build_link(self, getenv: &impl Fn(&str) -> String) -> String {
        match self {
            Platform::CircleCi => format!(
                "[workflow](https://circleci.com/workflow-run/{}) [job]({}) (job: {})",
                getenv("CIRCLE_WORKFLOW_ID"),
                getenv("CIRCLE_BUILD_URL"),
                getenv("CIRCLE_JOB"),
            ),
            Platform::GithubActions => format!(
                "[Build link]({}/{}/actions/runs/{})",
                getenv("GITHUB_SERVER_URL"),
                getenv("GITHUB_REPOSITORY"),
                getenv("GITHUB_RUN_ID"),
            ),
            Platform::Drone => format!(
                "[build]({}) [step]({}/{}/{})",
                getenv("DRONE_BUILD_LINK"),
                getenv("DRONE_BUILD_LINK"),
                getenv("DRONE_STAGE_NUMBER"),
                getenv("DRONE_STEP_NUMBER"),
            ),
            Platform::CodeBuild => {
                format!("[Build link]({})", getenv("CODEBUILD_BUILD_URL"))
            }
        }
    }
}

fn fill(slot: &mut String, value: String) {
    if slot.is_empty() && !value.is_empty() {
        *slot = value;
    }
}

/// `refs/pull/123/merge` -> 123; anything else -> 0.
fn pr_number_from_github_ref(github_ref: &str) -> u64 {
    let Some(rest) = github_ref.strip_prefix("refs/pull/") else {
        return 0;
    };
    let Some((number, _)) = rest.split_once('/') else {
        return 0;
    };
    number.parse().unwrap_or(0)
}

/// `https://github.com/foo/bar.git` -> ("foo", "bar").
fn repo_from_source_url(url: &str) -> Option<(String, String)> {
    let path = url.split("://").nth(1)?;
    let mut segments = path.trim_end_matches(".git").split('/');
    let _host = segments.next()?;
    let org = segments.next()?;
    let repo = segments.next()?;
    if org.is_empty() || repo.is_empty() {
        return None;
    }
    Some((org.to_string(), repo.to_string()))
}
