use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Onboarding,
    Signup,
    Login,
    UploadPrescription,
    MedicineAvailability,
    PharmacyDetails,
    Checkout,
    DrugInfo,
    MyPrescriptions,
    PrescriptionDetail,
    Insights,
    Profile,
    NotFound,
}

impl Route {
    pub const ALL: [Route; 13] = [
        Route::Home,
        Route::Onboarding,
        Route::Signup,
        Route::Login,
        Route::UploadPrescription,
        Route::MedicineAvailability,
        Route::PharmacyDetails,
        Route::Checkout,
        Route::DrugInfo,
        Route::MyPrescriptions,
        Route::PrescriptionDetail,
        Route::Insights,
        Route::Profile,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::Onboarding => "/onboarding",
            Self::Signup => "/signup",
            Self::Login => "/login",
            Self::UploadPrescription => "/upload-prescription",
            Self::MedicineAvailability => "/medicine-availability",
            Self::PharmacyDetails => "/pharmacy-details",
            Self::Checkout => "/checkout",
            Self::DrugInfo => "/drug-info",
            Self::MyPrescriptions => "/my-prescriptions",
            Self::PrescriptionDetail => "/prescription-detail",
            Self::Insights => "/insights",
            Self::Profile => "/profile",
            Self::NotFound => "*",
        }
    }

    /// Route for `path`; unknown paths resolve to [`Route::NotFound`]
    pub fn resolve(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };

        Self::ALL
            .into_iter()
            .find(|route| route.path() == path)
            .unwrap_or(Self::NotFound)
    }
}

impl FromStr for Route {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::resolve(s))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_named_route_resolves_to_itself() {
        for route in Route::ALL {
            assert_eq!(Route::resolve(route.path()), route);
        }
    }

    #[test]
    fn query_and_trailing_slash_are_ignored() {
        assert_eq!(Route::resolve("/checkout/?pharmacy=2"), Route::Checkout);
        assert_eq!(Route::resolve(""), Route::Home);
    }

    #[test]
    fn anything_else_is_not_found() {
        assert_eq!(Route::resolve("/admin"), Route::NotFound);
        assert_eq!("/drug-info/extra".parse::<Route>(), Ok(Route::NotFound));
    }
}
