pub mod routes;

use std::sync::Arc;

use tiny_http::Server;

use crate::service::PaletteService;

pub use routes::{dispatch, route, ApiResponse};

/// Accept loop. Each request gets its own thread so a slow segmentation
/// never stalls health checks or assignment calls.
pub fn serve(server: Server, service: Arc<PaletteService>) {
    for request in server.incoming_requests() {
        let service = Arc::clone(&service);
        std::thread::spawn(move || {
            dispatch(request, service);
        });
    }
}
