// Camera endpoints (ICameraV3 subset, no image transfer)

use crate::client::AlpacaClient;
use crate::error::Error;
use crate::models::CameraState;

impl AlpacaClient {
    pub async fn camera_state(&self) -> Result<CameraState, Error> {
        let code: i32 = self.get("camerastate").await?;
        Ok(CameraState::from_code(code))
    }

    pub async fn image_ready(&self) -> Result<bool, Error> {
        self.get("imageready").await
    }

    /// Begin an exposure of `duration_secs`; `light` is false for darks.
    pub async fn start_exposure(&self, duration_secs: f64, light: bool) -> Result<(), Error> {
        self.put(
            "startexposure",
            &[
                ("Duration", duration_secs.to_string()),
                ("Light", light.to_string()),
            ],
        )
        .await
    }

    pub async fn abort_exposure(&self) -> Result<(), Error> {
        self.put("abortexposure", &[]).await
    }

    pub async fn percent_completed(&self) -> Result<i32, Error> {
        self.get("percentcompleted").await
    }

    pub async fn ccd_temperature(&self) -> Result<f64, Error> {
        self.get("ccdtemperature").await
    }

    pub async fn cooler_on(&self) -> Result<bool, Error> {
        self.get("cooleron").await
    }

    pub async fn bin_x(&self) -> Result<i32, Error> {
        self.get("binx").await
    }

    pub async fn bin_y(&self) -> Result<i32, Error> {
        self.get("biny").await
    }

    /// Sensor width in unbinned pixels.
    pub async fn camera_x_size(&self) -> Result<i32, Error> {
        self.get("cameraxsize").await
    }

    /// Sensor height in unbinned pixels.
    pub async fn camera_y_size(&self) -> Result<i32, Error> {
        self.get("cameraysize").await
    }

    pub async fn sensor_name(&self) -> Result<String, Error> {
        self.get("sensorname").await
    }
}
