pub mod helix_handler;
