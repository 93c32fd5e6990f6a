mod determinism;
mod enforcement_boundary;
mod writer_layout;
