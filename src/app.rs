use show_image::{create_window, event, ImageInfo, ImageView, WindowOptions};

/// Helper, defining exit event to be an Escape key press.
fn is_exit_event(window_event: event::WindowEvent) -> bool {
    if let event::WindowEvent::KeyboardInput(event) = window_event {
        if event.input.key_code == Some(event::VirtualKeyCode::Escape)
            && event.input.state.is_released()
        {
            return true;
        }
    }

    return false;
}

/// Shows the rendered rgb8 image in a window until Escape is pressed or the
/// window is closed.
pub fn display(width: u32, height: u32, data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    let window_options = WindowOptions {
        size: Some([width, height]),
        ..Default::default()
    };
    let window = create_window("output", window_options)?;
    let event_channel = window.event_channel()?;

    let image_data = ImageView::new(ImageInfo::rgb8(width, height), data);
    window.set_image("image", image_data)?;

    for window_event in event_channel.iter() {
        if is_exit_event(window_event) {
            break;
        }
    }

    return Ok(());
}
