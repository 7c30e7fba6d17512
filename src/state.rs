use crate::admission::AdmissionController;

// app's shared state
pub struct AppState {
    pub admission: AdmissionController,
}
