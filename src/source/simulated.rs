use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::types::{
    Authorization, AuthorizationFlag, Fix, FixSubscription, PositionSource, SourceError,
    SubscriptionRequest,
};
use crate::projection::MAX_MERCATOR_LAT;

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy)]
struct Walker {
    latitude: f64,
    longitude: f64,
    step_lat: f64,
    step_lon: f64,
}

impl Walker {
    fn advance(&mut self) {
        let next_lat = self.latitude + self.step_lat;
        if next_lat.abs() > MAX_MERCATOR_LAT {
            self.step_lat = -self.step_lat;
        } else {
            self.latitude = next_lat;
        }

        let mut lon = self.longitude + self.step_lon;
        if lon > 180.0 {
            lon -= 360.0;
        } else if lon < -180.0 {
            lon += 360.0;
        }
        self.longitude = lon;
    }
}

/// Synthetic provider walking a straight line at one step per sampling interval.
pub struct SimulatedSource {
    authorization: AuthorizationFlag,
    accuracy_m: f64,
    walker: Arc<Mutex<Walker>>,
}

impl SimulatedSource {
    pub fn new(
        authorization: AuthorizationFlag,
        start: (f64, f64),
        step: (f64, f64),
        accuracy_m: f64,
    ) -> Self {
        Self {
            authorization,
            accuracy_m,
            walker: Arc::new(Mutex::new(Walker {
                latitude: start.0,
                longitude: start.1,
                step_lat: step.0,
                step_lon: step.1,
            })),
        }
    }

    fn fix_at(walker: &Walker, accuracy_m: f64) -> Fix {
        Fix {
            latitude: walker.latitude,
            longitude: walker.longitude,
            accuracy_m,
            time_ms: Utc::now().timestamp_millis(),
        }
    }
}

impl PositionSource for SimulatedSource {
    fn authorization(&self) -> Authorization {
        self.authorization.get()
    }

    fn current_fix(&self) -> Option<Fix> {
        if self.authorization.get() != Authorization::Granted {
            return None;
        }
        let walker = *self.walker.lock().unwrap();
        Some(Self::fix_at(&walker, self.accuracy_m))
    }

    fn subscribe(&self, request: SubscriptionRequest) -> Result<FixSubscription, SourceError> {
        if self.authorization.get() != Authorization::Granted {
            return Err(SourceError::Unauthorized);
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let walker = self.walker.clone();
        let accuracy_m = self.accuracy_m;
        // tokio intervals cannot tick at zero
        let period = request
            .min_interval
            .max(request.fastest_interval)
            .max(Duration::from_millis(1));

        info!("Simulated source emitting a fix every {:?}", period);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let fix = {
                    let mut walker = walker.lock().unwrap();
                    walker.advance();
                    Self::fix_at(&walker, accuracy_m)
                };

                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = tx.send(fix) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Simulated source feed ended");
        });

        Ok(FixSubscription::new(rx, cancel))
    }
}
