// Domain layer - values shared by every other layer

pub mod model;
