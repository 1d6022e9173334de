pub mod clock;
pub mod generator;
pub mod types;
pub mod uri;

pub use clock::{Clock, SystemClock};
pub use generator::PopTokenGenerator;
pub use types::{KeyLocation, ReqCnf, ReqCnfData, ShrParameters};
pub use uri::{UrlComponents, url_components};
