//! Cached home availability zone of the node.

use cns_nmagent::{NmAgentClient, GET_HOME_AZ_API};
use cns_types::{GetHomeAzResponse, HomeAzResponse, Response, ResponseCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct HomeAzMonitor {
    nmagent: Arc<dyn NmAgentClient>,
    refresh_interval: Duration,
    /// Whether the host offers the home AZ API. Queried once, cached after the first success.
    supported: OnceCell<bool>,
    cache: RwLock<Option<GetHomeAzResponse>>,
}

impl HomeAzMonitor {
    pub fn new(nmagent: Arc<dyn NmAgentClient>, refresh_interval: Duration) -> Self {
        Self {
            nmagent,
            refresh_interval,
            supported: OnceCell::new(),
            cache: RwLock::new(None),
        }
    }

    /// Latest cached answer. Before the first refresh this is an error.
    pub async fn get(&self) -> GetHomeAzResponse {
        match self.cache.read().await.clone() {
            Some(cached) => cached,
            None => GetHomeAzResponse {
                response: Response::new(
                    ResponseCode::UnexpectedError,
                    "home AZ has not been retrieved yet",
                ),
                home_az_response: HomeAzResponse::default(),
            },
        }
    }

    /// Ask the host agent once and cache the outcome, errors included.
    pub async fn populate(&self) {
        let answer = self.query().await;
        debug!(
            return_code = %answer.response.return_code,
            is_supported = answer.home_az_response.is_supported,
            home_az = answer.home_az_response.home_az,
            "Home AZ refreshed"
        );
        *self.cache.write().await = Some(answer);
    }

    async fn query(&self) -> GetHomeAzResponse {
        let supported = self
            .supported
            .get_or_try_init(|| async {
                let apis = self.nmagent.supported_apis().await?;
                Ok::<_, cns_nmagent::NmAgentError>(apis.iter().any(|api| api == GET_HOME_AZ_API))
            })
            .await;
        let supported = match supported {
            Ok(supported) => *supported,
            Err(e) => {
                warn!(error = %e, "Failed to get host agent supported APIs");
                return error_response(ResponseCode::NmAgentSupportedApisError, e.to_string());
            }
        };

        if !supported {
            return GetHomeAzResponse {
                response: Response::new(ResponseCode::Success, "HomeAz API is not supported"),
                home_az_response: HomeAzResponse {
                    is_supported: false,
                    home_az: 0,
                },
            };
        }

        match self.nmagent.home_az().await {
            Ok(az) => GetHomeAzResponse {
                response: Response::new(ResponseCode::Success, "Get Home Az succeeded"),
                home_az_response: HomeAzResponse {
                    is_supported: true,
                    home_az: az,
                },
            },
            Err(e) => {
                warn!(error = %e, "Failed to get home AZ");
                error_response(e.code(), e.to_string())
            }
        }
    }

    /// Refresh until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(refresh_secs = self.refresh_interval.as_secs(), "Starting home AZ monitor");
        let mut timer = interval(self.refresh_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Home AZ monitor stopped");
                    return;
                }
                _ = timer.tick() => self.populate().await,
            }
        }
    }
}

fn error_response(code: ResponseCode, message: String) -> GetHomeAzResponse {
    GetHomeAzResponse {
        response: Response::new(code, message),
        home_az_response: HomeAzResponse::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cns_nmagent::{MockNmAgent, NmAgentError};

    #[tokio::test]
    async fn test_read_before_refresh_is_error() {
        let monitor = HomeAzMonitor::new(Arc::new(MockNmAgent::new()), Duration::from_secs(60));
        assert_eq!(monitor.get().await.response.return_code, ResponseCode::UnexpectedError);
    }

    #[tokio::test]
    async fn test_unsupported_is_a_valid_answer() {
        let nma = Arc::new(MockNmAgent::new());
        nma.set_supported_apis(&["GetSupportedApis"]);
        let monitor = HomeAzMonitor::new(nma, Duration::from_secs(60));

        monitor.populate().await;
        let answer = monitor.get().await;
        assert!(answer.response.is_success());
        assert!(!answer.home_az_response.is_supported);
    }

    #[tokio::test]
    async fn test_support_is_queried_once() {
        let nma = Arc::new(MockNmAgent::new());
        nma.set_supported_apis(&[GET_HOME_AZ_API]);
        nma.set_home_az(2);
        let monitor = HomeAzMonitor::new(nma.clone(), Duration::from_secs(60));

        monitor.populate().await;
        assert_eq!(
            monitor.get().await.home_az_response,
            HomeAzResponse { is_supported: true, home_az: 2 }
        );

        // Later refreshes only ask for the zone.
        nma.set_supported_apis(&[]);
        nma.set_home_az(3);
        monitor.populate().await;
        assert_eq!(
            monitor.get().await.home_az_response,
            HomeAzResponse { is_supported: true, home_az: 3 }
        );
    }

    #[tokio::test]
    async fn test_supported_apis_failure_is_retried() {
        let nma = Arc::new(MockNmAgent::new());
        nma.fail_with(Some(NmAgentError::InternalServerError("boom".to_string())));
        let monitor = HomeAzMonitor::new(nma.clone(), Duration::from_secs(60));
        monitor.populate().await;
        assert_eq!(
            monitor.get().await.response.return_code,
            ResponseCode::NmAgentSupportedApisError
        );

        nma.fail_with(None);
        nma.set_supported_apis(&[GET_HOME_AZ_API]);
        nma.set_home_az(1);
        monitor.populate().await;
        assert!(monitor.get().await.home_az_response.is_supported);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let nma = Arc::new(MockNmAgent::new());
        let monitor = Arc::new(HomeAzMonitor::new(nma, Duration::from_millis(10)));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(monitor.clone().run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        task.await.unwrap();
        assert!(monitor.get().await.response.is_success());
    }
}
