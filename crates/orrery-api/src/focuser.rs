// Focuser endpoints (IFocuserV3 subset)

use crate::client::AlpacaClient;
use crate::error::Error;

impl AlpacaClient {
    pub async fn position(&self) -> Result<i32, Error> {
        self.get("position").await
    }

    pub async fn is_moving(&self) -> Result<bool, Error> {
        self.get("ismoving").await
    }

    pub async fn max_step(&self) -> Result<i32, Error> {
        self.get("maxstep").await
    }

    pub async fn absolute(&self) -> Result<bool, Error> {
        self.get("absolute").await
    }

    pub async fn focuser_temperature(&self) -> Result<f64, Error> {
        self.get("temperature").await
    }

    /// Absolute focusers move to `position`; relative ones move by it.
    pub async fn move_to(&self, position: i32) -> Result<(), Error> {
        self.put("move", &[("Position", position.to_string())]).await
    }

    pub async fn halt(&self) -> Result<(), Error> {
        self.put("halt", &[]).await
    }
}
