// Telescope endpoints (ITelescopeV3 subset)

use crate::client::AlpacaClient;
use crate::error::Error;

impl AlpacaClient {
    pub async fn slewing(&self) -> Result<bool, Error> {
        self.get("slewing").await
    }

    pub async fn can_slew(&self) -> Result<bool, Error> {
        self.get("canslew").await
    }

    pub async fn can_slew_async(&self) -> Result<bool, Error> {
        self.get("canslewasync").await
    }

    pub async fn can_park(&self) -> Result<bool, Error> {
        self.get("canpark").await
    }

    pub async fn can_find_home(&self) -> Result<bool, Error> {
        self.get("canfindhome").await
    }

    pub async fn can_set_tracking(&self) -> Result<bool, Error> {
        self.get("cansettracking").await
    }

    pub async fn at_park(&self) -> Result<bool, Error> {
        self.get("atpark").await
    }

    pub async fn at_home(&self) -> Result<bool, Error> {
        self.get("athome").await
    }

    pub async fn tracking(&self) -> Result<bool, Error> {
        self.get("tracking").await
    }

    pub async fn set_tracking(&self, tracking: bool) -> Result<(), Error> {
        self.put("tracking", &[("Tracking", tracking.to_string())])
            .await
    }

    /// Right ascension in hours.
    pub async fn right_ascension(&self) -> Result<f64, Error> {
        self.get("rightascension").await
    }

    /// Declination in degrees.
    pub async fn declination(&self) -> Result<f64, Error> {
        self.get("declination").await
    }

    pub async fn altitude(&self) -> Result<f64, Error> {
        self.get("altitude").await
    }

    pub async fn azimuth(&self) -> Result<f64, Error> {
        self.get("azimuth").await
    }

    pub async fn sidereal_time(&self) -> Result<f64, Error> {
        self.get("siderealtime").await
    }

    /// Start a slew to J2000 coordinates and return immediately.
    pub async fn slew_to_coordinates_async(&self, ra_hours: f64, dec_degrees: f64) -> Result<(), Error> {
        self.put(
            "slewtocoordinatesasync",
            &[
                ("RightAscension", ra_hours.to_string()),
                ("Declination", dec_degrees.to_string()),
            ],
        )
        .await
    }

    pub async fn abort_slew(&self) -> Result<(), Error> {
        self.put("abortslew", &[]).await
    }

    pub async fn park(&self) -> Result<(), Error> {
        self.put("park", &[]).await
    }

    pub async fn unpark(&self) -> Result<(), Error> {
        self.put("unpark", &[]).await
    }

    pub async fn find_home(&self) -> Result<(), Error> {
        self.put("findhome", &[]).await
    }
}
