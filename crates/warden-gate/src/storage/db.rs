//! SQLite database for the Warden gate.

warden_core::define_database!(GateDatabase, "Gate database migrations complete");
