mod config;
mod conversation;
mod gemini;
mod highlight;
mod markdown;
mod view;

use iced::{
    widget::{container, row, column, scrollable, text_input},
    Element, Length, Task, Theme, Subscription, Size,
    time, clipboard,
    keyboard::{self, Key},
    event::{self, Event as IcedEvent},
    window,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use conversation::{ConversationStore, HistoryId, RequestId, Resolution};
use gemini::{ClientError, GeminiClient};
use highlight::Highlighter;
use markdown::{Document, MarkdownRenderer};

fn main() -> iced::Result {
    init_logging();

    let config = config::Config::load();
    let window_settings = window::Settings {
        size: Size::new(config.window.width as f32, config.window.height as f32),
        min_size: Some(Size::new(
            config.window.min_width as f32,
            config.window.min_height as f32,
        )),
        position: window::Position::Centered,
        ..Default::default()
    };

    iced::application("Gemini Chat", App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window_settings)
        .run_with(move || App::new(config))
}

/// Log filter comes from `GEMCHAT_LOG`, defaulting to warnings only.
fn init_logging() {
    let filter = EnvFilter::try_from_env("GEMCHAT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[derive(Debug, Clone)]
pub enum Message {
    InputChanged(String),
    Submit,
    Responded(RequestId, Result<String, Arc<ClientError>>),
    Tick,
    Copy(String),
    StartEdit(HistoryId),
    DraftChanged(String),
    SaveEdit,
    CancelEdit,
    DeleteHistory(HistoryId),
    Escape,
}

struct App {
    store: ConversationStore,
    client: GeminiClient,
    renderer: MarkdownRenderer,
    // rendered answers keyed by transcript index
    rendered: HashMap<usize, Document>,
    loading_frame: usize,
}

impl App {
    fn new(config: config::Config) -> (Self, Task<Message>) {
        let client = GeminiClient::with_config(&config.gemini);
        tracing::info!(endpoint = client.endpoint(), "chat client ready");

        let app = App {
            store: ConversationStore::new(),
            client,
            renderer: MarkdownRenderer::new(Highlighter::new(&config.render.code_theme)),
            rendered: HashMap::new(),
            loading_frame: 0,
        };

        (app, text_input::focus(view::input_id()))
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::InputChanged(value) => {
                self.store.set_input(value);
                Task::none()
            }
            Message::Submit => {
                let Some(submission) = self.store.submit() else {
                    return Task::none();
                };
                self.loading_frame = 0;

                let client = self.client.clone();
                let request = Task::future(async move {
                    let result = client.generate(&submission.prompt).await.map_err(Arc::new);
                    Message::Responded(submission.id, result)
                });

                Task::batch([request, snap_to_end()])
            }
            Message::Responded(id, result) => {
                match self.store.resolve(id, result) {
                    Resolution::Answered(index) => {
                        let answer = &self.store.transcript()[index];
                        self.rendered.insert(index, self.renderer.render(answer.text()));
                    }
                    Resolution::Failed => {}
                    Resolution::Stale => return Task::none(),
                }
                Task::batch([snap_to_end(), text_input::focus(view::input_id())])
            }
            Message::Tick => {
                if self.store.is_busy() {
                    self.loading_frame = self.loading_frame.wrapping_add(1);
                }
                Task::none()
            }
            Message::Copy(contents) => clipboard::write(contents),
            Message::StartEdit(id) => {
                if self.store.start_edit(id) {
                    text_input::focus(view::edit_input_id())
                } else {
                    Task::none()
                }
            }
            Message::DraftChanged(value) => {
                self.store.update_draft(value);
                Task::none()
            }
            Message::SaveEdit => {
                if let Some(edit) = self.store.edit_session().cloned() {
                    self.store.save_edit(edit.id, edit.draft);
                }
                Task::none()
            }
            Message::CancelEdit | Message::Escape => {
                self.store.cancel_edit();
                Task::none()
            }
            Message::DeleteHistory(id) => {
                self.store.delete_history_entry(id);
                Task::none()
            }
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        let timer = if self.store.is_busy() {
            time::every(Duration::from_millis(80)).map(|_| Message::Tick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, _id| {
            if let IcedEvent::Keyboard(keyboard::Event::KeyPressed {
                key: Key::Named(keyboard::key::Named::Escape),
                ..
            }) = event
            {
                Some(Message::Escape)
            } else {
                None
            }
        });

        Subscription::batch([timer, events])
    }

    fn view(&self) -> Element<Message> {
        let sidebar = container(view::sidebar(&self.store))
            .width(Length::Fixed(280.0))
            .height(Length::Fill)
            .padding(16);

        let chat = column![
            view::transcript(&self.store, &self.rendered, self.loading_frame),
            view::composer(&self.store),
        ]
        .width(Length::Fill);

        container(row![sidebar, chat])
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }
}

fn snap_to_end() -> Task<Message> {
    scrollable::snap_to(view::transcript_id(), scrollable::RelativeOffset::END)
}
