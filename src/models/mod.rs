pub mod profile;

pub use profile::UserMedicalProfile;
