mod entity;
mod host;
mod input;
mod loop_runner;
mod metrics;
mod rendering;
mod runtime;
mod scene;
mod scheduler;
mod store;

pub use entity::{
    entity, step_kind, Direction, EntityAttributes, EntityHandle, EntityKind, EntityState,
    GameState, Vec2, DEFAULT_ENTITY_SIZE, DEFAULT_ENTITY_SPEED, PROJECTILE_DEFAULT_LIFE,
    REFERENCE_FRAME_RATE,
};
pub use host::{
    headless_platform, EventQueue, HeadlessControls, InputSource, ManualClock, Platform,
    QueuedFrames, SystemClock,
};
pub use input::{
    button, key, EventDisposition, InputCode, InputTracker, Phase, PointerPosition, RawInputEvent,
};
pub use loop_runner::{dom_key_code, run_app, AppError};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use rendering::{
    Color, ColorParseError, ImageData, ImageDataError, PixelBuffer, Rect, Sprite, SpriteError,
    SpriteOptions, Surface, SPRITE_EXTENSION,
};
pub use runtime::{boot, Runtime, RuntimeError};
pub use scene::{
    Behavior, EntityContext, EntityRecord, KindBehavior, Scene, SceneError, SceneId, SceneTick,
    Static, UpdateFn, Viewport,
};
pub use scheduler::{
    Clock, FrameHost, FrameRequestId, FrameScheduler, LoopConfig, SchedulerState, TickHandler,
    TickReport, Timestep,
};
pub use store::{ListenerError, State, Store, StoreError, Subscription};
